use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset, NaiveDate, TimeDelta, Utc};
use tracing::{debug, info};

use helpdesk_types::{Notice, NotificationIntent, TicketStatus, UserId};

use crate::notify::{Notifier, deliver_all};
use crate::store::TicketStore;

/// Source of "now" for a scan. Swapped out in tests to move time forward.
pub type Clock = Arc<dyn Fn() -> DateTime<Utc> + Send + Sync>;

fn system_clock() -> Clock {
    Arc::new(Utc::now)
}

/// One periodic background job.
#[async_trait]
pub trait ScanJob: Send + Sync {
    fn name(&self) -> &'static str;

    /// Runs a single tick: read a snapshot, emit intents, deliver them.
    async fn run(&self) -> anyhow::Result<ScanReport>;
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanReport {
    pub intents: usize,
    pub delivered: usize,
    pub failed: usize,
}

#[derive(Debug, Clone)]
pub struct SlaPolicy {
    pub sla_hours: u32,
    /// Every SLA alert goes to each of these.
    pub staff: Vec<UserId>,
}

/// Tickets still waiting on staff whose last activity is older than the SLA.
///
/// No memory of earlier alerts: a ticket keeps alerting on every tick until
/// it changes status or receives a message.
pub fn sla_breaches<S: TicketStore + ?Sized>(
    store: &S,
    policy: &SlaPolicy,
    now: DateTime<Utc>,
) -> anyhow::Result<Vec<NotificationIntent>> {
    let threshold = TimeDelta::try_hours(i64::from(policy.sla_hours))
        .and_then(|window| now.checked_sub_signed(window))
        .ok_or_else(|| anyhow::anyhow!("SLA window of {}h is out of range", policy.sla_hours))?;
    let tickets = store.list_tickets_older_than(
        &[TicketStatus::Open, TicketStatus::Answered],
        threshold,
    )?;

    let mut intents = Vec::with_capacity(tickets.len() * policy.staff.len());
    for ticket in tickets {
        let owner_name = store
            .get_user(ticket.owner_id)?
            .map(|u| u.display_name)
            .unwrap_or_else(|| "unknown".to_string());
        let elapsed = now - ticket.last_message_at;

        intents.extend(NotificationIntent::fan_out(
            &policy.staff,
            Notice::SlaBreach {
                ticket_id: ticket.id,
                owner_id: ticket.owner_id,
                owner_name,
                elapsed_minutes: elapsed.num_minutes(),
                sla_hours: policy.sla_hours,
            },
        ));
    }

    Ok(intents)
}

/// Owners of subscriptions ending today or tomorrow.
pub fn expiring_subscriptions<S: TicketStore + ?Sized>(
    store: &S,
    today: NaiveDate,
) -> anyhow::Result<Vec<NotificationIntent>> {
    let tomorrow = today + TimeDelta::days(1);
    let subscriptions = store.list_subscriptions_expiring_on_days(&[today, tomorrow])?;

    let mut intents = Vec::with_capacity(subscriptions.len());
    for sub in subscriptions {
        let notice = match sub.days_left(today) {
            0 => Notice::SubscriptionExpiresToday { end_date: sub.end_date },
            1 => Notice::SubscriptionExpiresTomorrow { end_date: sub.end_date },
            days => {
                debug!(user_id = %sub.user_id, days, "Subscription outside the reminder window");
                continue;
            }
        };
        intents.push(NotificationIntent::new(sub.user_id, notice));
    }

    Ok(intents)
}

/// Alerts staff about tickets breaching the response SLA.
pub struct SlaScan<S> {
    store: Arc<S>,
    notifier: Arc<dyn Notifier>,
    policy: SlaPolicy,
    delivery_timeout: Duration,
    clock: Clock,
}

impl<S: TicketStore + 'static> SlaScan<S> {
    pub fn new(
        store: Arc<S>,
        notifier: Arc<dyn Notifier>,
        policy: SlaPolicy,
        delivery_timeout: Duration,
    ) -> Self {
        Self {
            store,
            notifier,
            policy,
            delivery_timeout,
            clock: system_clock(),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }
}

#[async_trait]
impl<S: TicketStore + 'static> ScanJob for SlaScan<S> {
    fn name(&self) -> &'static str {
        "sla"
    }

    async fn run(&self) -> anyhow::Result<ScanReport> {
        info!("Running SLA check (limit {}h)", self.policy.sla_hours);
        let now = (self.clock)();

        // Run the blocking store reads off the async runtime
        let store = self.store.clone();
        let policy = self.policy.clone();
        let intents =
            tokio::task::spawn_blocking(move || sla_breaches(&*store, &policy, now)).await??;

        let delivery = deliver_all(&*self.notifier, &intents, self.delivery_timeout).await;
        info!(
            "SLA check complete: {} alerts, {} delivered, {} failed",
            intents.len(),
            delivery.delivered,
            delivery.failed
        );

        Ok(ScanReport {
            intents: intents.len(),
            delivered: delivery.delivered,
            failed: delivery.failed,
        })
    }
}

/// Reminds users whose subscription ends today or tomorrow.
pub struct SubscriptionScan<S> {
    store: Arc<S>,
    notifier: Arc<dyn Notifier>,
    /// Local offset that decides which calendar day "today" is.
    offset: FixedOffset,
    delivery_timeout: Duration,
    clock: Clock,
}

impl<S: TicketStore + 'static> SubscriptionScan<S> {
    pub fn new(
        store: Arc<S>,
        notifier: Arc<dyn Notifier>,
        offset: FixedOffset,
        delivery_timeout: Duration,
    ) -> Self {
        Self {
            store,
            notifier,
            offset,
            delivery_timeout,
            clock: system_clock(),
        }
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }
}

#[async_trait]
impl<S: TicketStore + 'static> ScanJob for SubscriptionScan<S> {
    fn name(&self) -> &'static str {
        "subscriptions"
    }

    async fn run(&self) -> anyhow::Result<ScanReport> {
        info!("Running subscription check");
        let today = (self.clock)().with_timezone(&self.offset).date_naive();

        let store = self.store.clone();
        let intents =
            tokio::task::spawn_blocking(move || expiring_subscriptions(&*store, today)).await??;

        let delivery = deliver_all(&*self.notifier, &intents, self.delivery_timeout).await;
        info!(
            "Subscription check complete: {} reminders, {} delivered, {} failed",
            intents.len(),
            delivery.delivered,
            delivery.failed
        );

        Ok(ScanReport {
            intents: intents.len(),
            delivered: delivery.delivered,
            failed: delivery.failed,
        })
    }
}
