//! Browser attachment for easel: manager client, CDP sessions, and the
//! [`Surface`] trait that job logic drives pages through.

mod dom;
mod error;
mod manager;
mod session;
mod surface;

pub use error::BrowserError;
pub use manager::{BrowserProfile, ManagerClient};
pub use session::{CdpConnector, Session, SessionOptions};
pub use surface::{Action, Bounds, Connect, Query, Surface, UiElement};
