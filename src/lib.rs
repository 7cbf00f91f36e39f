pub mod credentials;
pub mod event;
pub mod identity;
pub mod lms;
pub mod members;
pub mod retry;
pub mod settings;
pub mod sync;

#[cfg(test)]
mod testing;

pub use credentials::CredentialStore;
pub use event::{Attendee, ConferenceEndEvent};
pub use lms::HttpConnector;
pub use settings::Settings;
pub use sync::{Aborted, Engine, Summary};
