//! Tax computation for individual landlords and property companies.
//!
//! Everything here is pure: the same inputs and rate table always produce
//! the same result, and malformed figures degrade to zero instead of
//! failing.

pub mod common;
pub mod company;
pub mod payments;
pub mod personal;
pub mod validation;

pub use company::{CompanyTaxCalculator, calculate_company_tax};
pub use payments::{PaymentDate, PaymentSchedule, corporation_tax_due_date, quarterly_payments};
pub use personal::{PersonalTaxCalculator, calculate_personal_tax};
pub use validation::{InputValidation, validate_calculation_inputs, validate_company_details};
