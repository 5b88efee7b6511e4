//! Chrome automation over the DevTools Protocol, plus the network activity
//! recorder and its trace export.

pub mod cdp;
pub mod driver;
pub mod recorder;
pub mod trace;

pub use cdp::CdpConnection;
pub use driver::{BrowserDriver, NavigationOutcome};
pub use recorder::{NetworkRecorder, NetworkSummary, RequestEvent, ResponseEvent};
