pub mod error;
pub mod layout;
pub mod outcome;
pub mod pensioner;
pub mod pincode;
pub mod settings;
pub mod summary;

// Raw sheet value objects
pub mod sheet;
