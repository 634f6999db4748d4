use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{FixedOffset, NaiveDate, Utc};

use helpdesk_core::{DeliveryReport, Helpdesk, Notifier, Outcome, ScanRunner, deliver_all};
use helpdesk_db::Database;
use helpdesk_types::NotificationIntent;

use crate::error::ApiError;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub helpdesk: Helpdesk<Database>,
    pub notifier: Arc<dyn Notifier>,
    pub delivery_timeout: Duration,
    /// Local offset used to decide which calendar day it is.
    pub offset: FixedOffset,
    /// Scheduled scans by name, for manual runs.
    pub scans: HashMap<&'static str, ScanRunner>,
}

impl AppStateInner {
    /// Runs a blocking helpdesk operation off the async runtime.
    pub async fn run<T, F>(&self, f: F) -> Result<T, ApiError>
    where
        T: Send + 'static,
        F: FnOnce(&Helpdesk<Database>) -> helpdesk_core::Result<T> + Send + 'static,
    {
        let helpdesk = self.helpdesk.clone();
        Ok(tokio::task::spawn_blocking(move || f(&helpdesk)).await??)
    }

    /// Like `run`, then delivers whatever notices the operation produced.
    /// Delivery failures are logged and never undo the committed change.
    pub async fn run_and_notify<T, F>(&self, f: F) -> Result<(T, DeliveryReport), ApiError>
    where
        T: Send + 'static,
        F: FnOnce(&Helpdesk<Database>) -> helpdesk_core::Result<Outcome<T>> + Send + 'static,
    {
        let outcome = self.run(f).await?;
        let report = self.deliver(&outcome.notifications).await;
        Ok((outcome.value, report))
    }

    pub async fn deliver(&self, intents: &[NotificationIntent]) -> DeliveryReport {
        deliver_all(&*self.notifier, intents, self.delivery_timeout).await
    }

    pub fn today(&self) -> NaiveDate {
        Utc::now().with_timezone(&self.offset).date_naive()
    }
}
