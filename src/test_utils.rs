//! Shared test utilities for scholarlink.
//!
//! This module provides an in-memory database with every table, seed helpers
//! with sensible defaults, and scripted fakes for the external collaborators
//! that record every call they receive.

use crate::{
    context::{Actor, AppContext},
    core::{
        booking::NewBooking,
        ledger,
        notification::{NewNotification, Notifier},
    },
    entities::{
        booking,
        booking::{BookingStatus, PaymentStatus, SharedDocuments},
        earning,
        earning::EarningStatus,
        payment_attempt,
        payment_attempt::AttemptStatus,
        profile,
        profile::Role,
        service, service_addon, withdrawal,
        withdrawal::WithdrawalStatus,
    },
    errors::{Error, Result},
    providers::{
        CollectRequest, MeetingLinkProvisioner, MobileMoneyOperator, PayerDetails,
        PaymentGateway, PayoutRequest, ProviderResponse,
    },
};
use async_trait::async_trait;
use chrono::{NaiveDate, NaiveTime, Utc};
use sea_orm::{ActiveModelTrait, DatabaseConnection, Set};
use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// Provider used by most tests
pub const PROVIDER_ID: &str = "provider-1";
/// Client used by most tests
pub const CLIENT_ID: &str = "student-1";

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Creates an in-memory `SQLite` database with all tables initialized.
/// This is the standard setup for all integration tests.
pub async fn setup_test_db() -> Result<DatabaseConnection> {
    let db = sea_orm::Database::connect("sqlite::memory:").await?;
    crate::config::database::create_tables(&db).await?;
    Ok(db)
}

/// The default client, a student
pub fn student() -> Actor {
    Actor::new(CLIENT_ID, Role::Student)
}

/// The default provider, a research-aid
pub fn provider() -> Actor {
    Actor::new(PROVIDER_ID, Role::ResearchAid)
}

/// MTN payer with the default test phone number
pub fn mtn_payer() -> PayerDetails {
    PayerDetails {
        phone: "677000000".to_string(),
        operator: MobileMoneyOperator::Mtn,
        name: Some("Student One".to_string()),
        email: Some("student@example.com".to_string()),
    }
}

/// Creates a profile.
pub async fn create_test_profile(
    db: &DatabaseConnection,
    id: &str,
    full_name: &str,
    role: Role,
) -> Result<profile::Model> {
    profile::ActiveModel {
        id: Set(id.to_string()),
        full_name: Set(full_name.to_string()),
        role: Set(role),
        email: Set(None),
        created_at: Set(Utc::now()),
    }
    .insert(db)
    .await
    .map_err(Into::into)
}

/// Creates an active "Thesis review" service priced in XAF.
pub async fn create_test_service(
    db: &DatabaseConnection,
    provider_id: &str,
    base_price: f64,
) -> Result<service::Model> {
    service::ActiveModel {
        provider_id: Set(provider_id.to_string()),
        title: Set("Thesis review".to_string()),
        base_price: Set(base_price),
        currency: Set("XAF".to_string()),
        is_active: Set(true),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(Into::into)
}

/// Creates an active add-on for a service.
pub async fn create_test_addon(
    db: &DatabaseConnection,
    service_id: i64,
    name: &str,
    price: f64,
) -> Result<service_addon::Model> {
    service_addon::ActiveModel {
        service_id: Set(service_id),
        name: Set(name.to_string()),
        price: Set(price),
        is_active: Set(true),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(Into::into)
}

/// Booking input for `service_id` with sensible defaults.
///
/// # Defaults
/// * provider: [`PROVIDER_ID`]
/// * slot: 2025-03-01 10:00, 60 minutes
/// * price: 15000 XAF, no add-ons, unpaid
pub fn new_booking_input(service_id: i64) -> NewBooking {
    NewBooking {
        provider_id: PROVIDER_ID.to_string(),
        service_id,
        academic_level: "Masters".to_string(),
        scheduled_date: NaiveDate::from_ymd_opt(2025, 3, 1).unwrap_or_default(),
        scheduled_time: NaiveTime::from_hms_opt(10, 0, 0).unwrap_or_default(),
        duration_minutes: 60,
        base_price: 15000.0,
        addon_price: 0.0,
        total_price: 15000.0,
        currency: "XAF".to_string(),
        client_notes: Some("Chapter 2 needs the most attention".to_string()),
        addon_ids: Vec::new(),
        payment_reference: None,
    }
}

async fn insert_booking(
    db: &DatabaseConnection,
    status: BookingStatus,
    payment_status: PaymentStatus,
    payment_id: Option<String>,
) -> Result<booking::Model> {
    let service = create_test_service(db, PROVIDER_ID, 15000.0).await?;
    let input = new_booking_input(service.id);
    let now = Utc::now();
    booking::ActiveModel {
        provider_id: Set(input.provider_id),
        client_id: Set(CLIENT_ID.to_string()),
        service_id: Set(service.id),
        academic_level: Set(input.academic_level),
        scheduled_date: Set(input.scheduled_date),
        scheduled_time: Set(input.scheduled_time),
        duration_minutes: Set(input.duration_minutes),
        base_price: Set(input.base_price),
        addon_price: Set(input.addon_price),
        total_price: Set(input.total_price),
        currency: Set(input.currency),
        status: Set(status),
        payment_status: Set(payment_status),
        payment_id: Set(payment_id),
        meeting_link: Set(None),
        client_notes: Set(input.client_notes),
        provider_notes: Set(None),
        shared_documents: Set(SharedDocuments::default()),
        has_review: Set(false),
        cancellation_reason: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(Into::into)
}

/// Inserts a pending, unpaid 15000 XAF booking between the default parties.
pub async fn create_test_booking(harness: &TestHarness) -> Result<booking::Model> {
    insert_booking(
        &harness.ctx.database,
        BookingStatus::Pending,
        PaymentStatus::Pending,
        None,
    )
    .await
}

/// Inserts a confirmed booking paid with `reference`, plus its pending earning
/// (zero for the free tier).
pub async fn create_paid_booking(harness: &TestHarness, reference: &str) -> Result<booking::Model> {
    let db = &harness.ctx.database;
    let booking = insert_booking(
        db,
        BookingStatus::Confirmed,
        PaymentStatus::Paid,
        Some(reference.to_string()),
    )
    .await?;
    let amount = if reference == crate::providers::payment::FREE_PAYMENT_REFERENCE {
        0.0
    } else {
        booking.total_price
    };
    ledger::record_booking_earning(db, &booking, amount).await?;
    Ok(booking)
}

/// Inserts an earning not tied to a booking.
pub async fn seed_earning(
    db: &DatabaseConnection,
    provider_id: &str,
    amount: f64,
    status: EarningStatus,
) -> Result<earning::Model> {
    earning::ActiveModel {
        provider_id: Set(provider_id.to_string()),
        booking_id: Set(None),
        amount: Set(amount),
        currency: Set("XAF".to_string()),
        project_label: Set("Data analysis".to_string()),
        client_label: Set("Student One".to_string()),
        status: Set(status),
        date: Set(Utc::now()),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(Into::into)
}

/// Inserts a withdrawal in the given state.
pub async fn seed_withdrawal(
    db: &DatabaseConnection,
    provider_id: &str,
    amount: f64,
    status: WithdrawalStatus,
) -> Result<withdrawal::Model> {
    withdrawal::ActiveModel {
        provider_id: Set(provider_id.to_string()),
        amount: Set(amount),
        currency: Set("XAF".to_string()),
        status: Set(status),
        requested_at: Set(Utc::now()),
        processed_at: Set(None),
        notes: Set(Some("MTN Mobile Money: 677000000".to_string())),
        payout_reference: Set(None),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(Into::into)
}

/// Inserts a payment attempt for a booking.
pub async fn seed_payment_attempt(
    db: &DatabaseConnection,
    booking_id: i64,
    status: AttemptStatus,
    reference: Option<&str>,
) -> Result<payment_attempt::Model> {
    let now = Utc::now();
    payment_attempt::ActiveModel {
        booking_id: Set(booking_id),
        amount: Set(15000.0),
        currency: Set("XAF".to_string()),
        status: Set(status),
        reference: Set(reference.map(ToString::to_string)),
        created_at: Set(now),
        updated_at: Set(now),
        ..Default::default()
    }
    .insert(db)
    .await
    .map_err(Into::into)
}

/// Payment provider answering from queued responses.
///
/// With an empty queue it answers with a declined response.
#[derive(Debug, Default)]
pub struct ScriptedPaymentGateway {
    collect_responses: Mutex<VecDeque<Result<ProviderResponse>>>,
    deposit_responses: Mutex<VecDeque<Result<ProviderResponse>>>,
    collect_calls: Mutex<Vec<CollectRequest>>,
    deposit_calls: Mutex<Vec<PayoutRequest>>,
    delay: Mutex<Option<Duration>>,
}

impl ScriptedPaymentGateway {
    /// Queues the answer to the next collection.
    pub fn push_collect(&self, response: Result<ProviderResponse>) {
        lock(&self.collect_responses).push_back(response);
    }

    /// Queues the answer to the next payout.
    pub fn push_deposit(&self, response: Result<ProviderResponse>) {
        lock(&self.deposit_responses).push_back(response);
    }

    /// Makes every call wait before answering.
    pub fn set_delay(&self, delay: Duration) {
        *lock(&self.delay) = Some(delay);
    }

    /// Collections received so far
    pub fn collect_calls(&self) -> Vec<CollectRequest> {
        lock(&self.collect_calls).clone()
    }

    /// Payouts received so far
    pub fn deposit_calls(&self) -> Vec<PayoutRequest> {
        lock(&self.deposit_calls).clone()
    }

    async fn wait(&self) {
        let delay = *lock(&self.delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
    }
}

#[async_trait]
impl PaymentGateway for ScriptedPaymentGateway {
    async fn collect(&self, request: &CollectRequest) -> Result<ProviderResponse> {
        lock(&self.collect_calls).push(request.clone());
        self.wait().await;
        let next = lock(&self.collect_responses).pop_front();
        next.unwrap_or_else(|| Ok(ProviderResponse::default()))
    }

    async fn deposit(&self, request: &PayoutRequest) -> Result<ProviderResponse> {
        lock(&self.deposit_calls).push(request.clone());
        self.wait().await;
        let next = lock(&self.deposit_responses).pop_front();
        next.unwrap_or_else(|| Ok(ProviderResponse::default()))
    }
}

/// Meeting provisioner returning `https://meet.example.com/booking-{id}`
#[derive(Debug, Default)]
pub struct FakeMeetingProvisioner {
    failure: Mutex<Option<String>>,
}

impl FakeMeetingProvisioner {
    /// Makes every following call fail with `reason`.
    pub fn fail_with(&self, reason: &str) {
        *lock(&self.failure) = Some(reason.to_string());
    }
}

#[async_trait]
impl MeetingLinkProvisioner for FakeMeetingProvisioner {
    async fn provision(&self, booking_id: i64) -> Result<String> {
        match lock(&self.failure).clone() {
            Some(reason) => Err(Error::MeetingLink { reason }),
            None => Ok(format!("https://meet.example.com/booking-{booking_id}")),
        }
    }
}

/// Notifier keeping delivered notifications in memory
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    fail: bool,
    attempts: Mutex<usize>,
    sent: Mutex<Vec<NewNotification>>,
}

impl RecordingNotifier {
    /// A notifier that delivers everything
    pub fn new() -> Self {
        Self::default()
    }

    /// A notifier whose every delivery fails
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Self::default()
        }
    }

    /// Deliveries tried, including failed ones
    pub fn attempts(&self) -> usize {
        *lock(&self.attempts)
    }

    /// Delivered notifications in order
    pub fn sent(&self) -> Vec<NewNotification> {
        lock(&self.sent).clone()
    }

    /// Forgets delivered notifications
    pub fn clear(&self) {
        lock(&self.sent).clear();
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn notify(&self, notification: &NewNotification) -> Result<()> {
        *lock(&self.attempts) += 1;
        if self.fail {
            return Err(Error::validation("notification channel unavailable"));
        }
        lock(&self.sent).push(notification.clone());
        Ok(())
    }
}

/// An application context wired to fakes, with handles to inspect them
pub struct TestHarness {
    /// Context wired to the fakes below
    pub ctx: AppContext,
    /// Payment and payout fake
    pub payments: Arc<ScriptedPaymentGateway>,
    /// Meeting-link fake
    pub meetings: Arc<FakeMeetingProvisioner>,
    /// Notification recorder
    pub notifier: Arc<RecordingNotifier>,
}

impl TestHarness {
    /// Wires fresh fakes around `database` with a 5 second payment timeout.
    pub fn with_database(database: DatabaseConnection) -> Self {
        Self::with_timeout(database, Duration::from_secs(5))
    }

    fn with_timeout(database: DatabaseConnection, payment_timeout: Duration) -> Self {
        let payments = Arc::new(ScriptedPaymentGateway::default());
        let meetings = Arc::new(FakeMeetingProvisioner::default());
        let notifier = Arc::new(RecordingNotifier::new());
        let ctx = AppContext::new(
            database,
            Arc::clone(&payments) as Arc<dyn PaymentGateway>,
            Arc::clone(&meetings) as Arc<dyn MeetingLinkProvisioner>,
            Arc::clone(&notifier) as Arc<dyn Notifier>,
            payment_timeout,
            "XAF",
        );
        Self {
            ctx,
            payments,
            meetings,
            notifier,
        }
    }
}

/// Sets up a complete test environment: database, fakes, and the default
/// provider and client profiles.
pub async fn setup_harness() -> Result<TestHarness> {
    setup_harness_with_timeout(Duration::from_secs(5)).await
}

/// Like [`setup_harness`] with a custom payment timeout.
pub async fn setup_harness_with_timeout(payment_timeout: Duration) -> Result<TestHarness> {
    let db = setup_test_db().await?;
    create_test_profile(&db, PROVIDER_ID, "Dr. Provider One", Role::ResearchAid).await?;
    create_test_profile(&db, CLIENT_ID, "Student One", Role::Student).await?;
    Ok(TestHarness::with_timeout(db, payment_timeout))
}
