pub use super::reports::Entity as Reports;
