//! AgenticCapture: click a UI trigger in a remote browser and reliably acquire the file it produces.

pub mod actuator;
pub mod config;
pub mod console;
pub mod coordinator;
pub mod driver;
pub mod error;
pub mod mime;
pub mod patterns;
pub mod persist;
pub mod policy;
pub mod resolver;
pub mod session;
pub mod signals;
pub mod store;
pub mod types;

pub use actuator::act;
pub use config::CaptureConfig;
pub use console::ConsoleLog;
pub use coordinator::{AcquisitionCoordinator, AcquisitionRequest, Phase};
pub use driver::chromium::{find_chromium, ChromiumDriver, ChromiumOptions};
pub use driver::{BrowserDriver, BrowsingContext, DownloadHandle, NoopDriver, PageHandle};
pub use error::{ActionError, CaptureError, CaptureResult, DriverError, DriverResult, ResolveError};
pub use mime::TargetMedia;
pub use persist::PersistTarget;
pub use policy::{Strategy, StrategyPolicy};
pub use session::SessionCloner;
pub use store::{ArtifactStore, StoreEvent};
pub use types::*;
