//! Page objects for the portal
//!
//! Each page object borrows a [`crate::page::Page`] and knows the selectors
//! and flows of one screen. Assertions that depend on the UI settling poll
//! through [`crate::watch::poll_until`] instead of failing on first read.

pub mod base;
pub mod data_transfer;
pub mod login;
pub mod popup;

pub use base::BasePage;
pub use data_transfer::DataTransferPage;
pub use login::LoginPage;
pub use popup::PopupHandler;
