//! Helpdesk core: ticket lifecycle, active-ticket routing, message threads
//! and the periodic notification scans.
//!
//! Storage and delivery are reached only through the `TicketStore` and
//! `Notifier` traits; everything in here is transport-agnostic.

pub mod error;
pub mod lifecycle;
pub mod notify;
pub mod router;
pub mod scan;
pub mod scheduler;
pub mod service;
pub mod store;
pub mod thread;

pub use error::{HelpdeskError, Result};
pub use lifecycle::{Audience, TicketEvent, Transition, transition};
pub use notify::{Ack, DeliveryError, DeliveryReport, Notifier, deliver_all};
pub use router::ActiveTicketRouter;
pub use scan::{ScanJob, ScanReport, SlaPolicy, SlaScan, SubscriptionScan};
pub use scheduler::{ScanRunner, Scheduler, SchedulerHandle, TickOutcome, Trigger};
pub use service::{Actor, Helpdesk, Outcome};
pub use store::{Guarded, TicketStore};
pub use thread::MessageThread;
