pub mod buffer;
pub mod error;
pub mod grant;
pub mod instance;
pub mod logging;
pub mod metapage;
pub mod platform;

pub use buffer::{RemoteBuffer, SharedBuffer};
pub use error::{GrantError, GrantResult, ReleaseError};
pub use grant::{DomainId, GrantRef, PAGE_SIZE};
pub use instance::Instance;
