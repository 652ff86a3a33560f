mod authorization;
mod company;
pub mod lenient;
mod personal;
mod rates;
mod submission;
mod tax_year;
mod vendor;

pub use authorization::{EncryptedSecret, HmrcAuthorization};
pub use company::{
    CapitalAllowances, CompanyDetails, CompanyTaxAdjustments, CompanyTaxBreakdown,
    CompanyTaxResult, Director, GroupRelief, LossesCarriedForward, RdExpenditure,
};
pub use personal::{
    PersonalTaxBreakdown, PersonalTaxResult, PropertyExpenses, PropertyIncome, TaxAdjustments,
};
pub use rates::{
    AllowanceRates, CorporationRates, NationalInsuranceRates, PersonalRates, RatesError,
    TaxYearRates,
};
pub use submission::{SubmissionRecord, SubmissionStatus, SubmissionType};
pub use tax_year::{TaxYear, TaxYearError};
pub use vendor::VendorMetadata;
