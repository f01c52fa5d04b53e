/// Coordinator for the externally-automated SSO login flow.
///
/// Drives the page driver through landing, completion detection and
/// profile scraping, then persists the result. Side effects are strictly
/// binary: either the flow completes with exactly one identity write and
/// one ledger write, or it ends (timeout, cancel, scrape failure) with
/// zero writes.
use crate::config::SsoConfig;
use crate::credential::CredentialStore;
use crate::db::models::{Identity, LoginType, NewSessionEvent};
use crate::error::{GateError, GateResult};
use crate::identity::{IdentityRepository, ProfileUpdate};
use crate::ledger::EventLedger;
use crate::sso::{
    login_marker_probe, parse_field_probe, profile_field_probe, PageDriver, ProfileAccumulator,
    SsoProfile, SsoState, REQUIRED_PROFILE_FIELDS,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

/// Re-probe passes over still-missing profile fields before the scrape
/// is reported as failed.
const SCRAPE_PASSES: usize = 5;

/// Cancels a running flow from outside. The coordinator observes the
/// signal at every suspension point; after it fires, no tick mutates
/// state and no write occurs.
pub struct CancelHandle {
    tx: watch::Sender<bool>,
}

impl CancelHandle {
    pub fn cancel(&self) {
        let _ = self.tx.send(true);
    }
}

/// State machine supervising one external login run
pub struct ExternalAuthCoordinator {
    config: SsoConfig,
    device: String,
    driver: Arc<dyn PageDriver>,
    credentials: CredentialStore,
    identities: IdentityRepository,
    ledger: EventLedger,
    state: SsoState,
    profile: Option<SsoProfile>,
    cancel_rx: watch::Receiver<bool>,
}

impl ExternalAuthCoordinator {
    pub fn new(
        config: SsoConfig,
        device: String,
        driver: Arc<dyn PageDriver>,
        identities: IdentityRepository,
        ledger: EventLedger,
    ) -> (Self, CancelHandle) {
        let (tx, cancel_rx) = watch::channel(false);
        (
            Self {
                config,
                device,
                driver,
                credentials: CredentialStore::new(),
                identities,
                ledger,
                state: SsoState::Idle,
                profile: None,
                cancel_rx,
            },
            CancelHandle { tx },
        )
    }

    pub fn state(&self) -> SsoState {
        self.state
    }

    /// Navigate to the landing location and poll until the
    /// authenticated-session marker appears, then scrape the profile.
    /// Returns the complete profile and leaves the flow awaiting the
    /// caller's secret.
    pub async fn await_external_login(&mut self) -> GateResult<SsoProfile> {
        if self.state != SsoState::Idle {
            return Err(GateError::Validation(format!(
                "Cannot start external login from state {:?}",
                self.state
            )));
        }

        self.check_cancelled().await?;

        self.driver.navigate(&self.config.landing_url).await?;
        self.state = SsoState::AwaitingExternalLogin;
        self.driver.wait_for_load().await?;

        self.poll_for_marker().await?;
        self.state = SsoState::DetectingCompletion;
        tracing::info!("External session marker detected");

        self.driver.navigate(&self.config.profile_url).await?;
        self.driver.wait_for_load().await?;
        self.state = SsoState::ScrapingProfile;

        let profile = match self.scrape_profile().await {
            Ok(profile) => profile,
            Err(e) => {
                // No writes have happened; restore the pre-login view and
                // let the caller restart the flow.
                if !matches!(e, GateError::Cancelled) {
                    self.driver.navigate(&self.config.home_url).await.ok();
                    self.state = SsoState::Idle;
                }
                return Err(e);
            }
        };

        self.state = SsoState::AwaitingSecretInput;
        self.profile = Some(profile.clone());
        Ok(profile)
    }

    /// Finish the flow with the caller-chosen secret: mint the credential,
    /// merge the scraped profile and record the SSO login event. No
    /// automatic retry on failure.
    pub async fn complete_with_secret(&mut self, secret: &str) -> GateResult<(Identity, i64)> {
        if self.state != SsoState::AwaitingSecretInput {
            return Err(GateError::Validation(format!(
                "No scraped profile awaiting a secret in state {:?}",
                self.state
            )));
        }

        self.check_cancelled().await?;

        let profile = self
            .profile
            .clone()
            .ok_or_else(|| GateError::Internal("Profile lost before completion".to_string()))?;

        let cred = self.credentials.generate(&profile.email, secret);
        let identity_id = self
            .identities
            .merge_sso_profile(
                &profile.email,
                &ProfileUpdate {
                    name: Some(profile.name.clone()),
                    phone: Some(profile.phone.clone()),
                    title: Some(profile.title.clone()),
                },
                &cred.salt,
                &cred.hash,
            )
            .await?;

        let event_id = self
            .ledger
            .record_login(&NewSessionEvent {
                email: profile.email.clone(),
                device: self.device.clone(),
                login_time: None,
                login_type: LoginType::Sso,
            })
            .await?;

        let identity = self.identities.find_by_id(identity_id).await?;
        self.state = SsoState::Completed;
        tracing::info!(identity_id, event_id, "External login completed");
        Ok((identity, event_id))
    }

    /// Poll the landing page until the session marker shows up, bounded by
    /// the one-shot overall deadline. An absent marker is not an error.
    async fn poll_for_marker(&mut self) -> GateResult<()> {
        let deadline =
            tokio::time::Instant::now() + Duration::from_millis(self.config.overall_timeout_ms);
        let mut ticker =
            tokio::time::interval(Duration::from_millis(self.config.poll_interval_ms));
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);

        let mut cancel_rx = self.cancel_rx.clone();
        loop {
            tokio::select! {
                biased;
                _ = cancel_rx.changed() => {
                    return self.enter_cancelled().await;
                }
                _ = tokio::time::sleep_until(deadline) => {
                    tracing::warn!("External login timed out before the session marker appeared");
                    self.driver.navigate(&self.config.home_url).await.ok();
                    self.state = SsoState::TimedOut;
                    return Err(GateError::Timeout);
                }
                _ = ticker.tick() => {
                    let marker = self.driver.inject_probe(&login_marker_probe()).await?;
                    if !marker.trim().is_empty() {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Probe each required field, re-probing the missing ones over a
    /// bounded number of passes. Advances only with the complete set.
    async fn scrape_profile(&mut self) -> GateResult<SsoProfile> {
        let mut acc = ProfileAccumulator::default();
        let pass_delay = Duration::from_millis(self.config.poll_interval_ms);
        let mut cancel_rx = self.cancel_rx.clone();

        for pass in 0..SCRAPE_PASSES {
            for field in REQUIRED_PROFILE_FIELDS {
                if acc.has(field) {
                    continue;
                }
                let raw = self.driver.inject_probe(&profile_field_probe(field)).await?;
                if let Some(value) = parse_field_probe(field, &raw) {
                    acc.insert(field, value);
                }
            }

            if let Some(profile) = acc.finalize() {
                return Ok(profile);
            }

            tracing::debug!(pass, missing = ?acc.missing(), "Profile scrape pass incomplete");
            tokio::select! {
                biased;
                _ = cancel_rx.changed() => {
                    self.enter_cancelled().await?;
                }
                _ = tokio::time::sleep(pass_delay) => {}
            }
        }

        Err(GateError::ScrapeIncomplete {
            missing: acc.missing(),
        })
    }

    async fn check_cancelled(&mut self) -> GateResult<()> {
        if *self.cancel_rx.borrow() {
            self.enter_cancelled().await?;
        }
        Ok(())
    }

    /// Stop the flow with zero writes and restore the pre-login view
    async fn enter_cancelled(&mut self) -> GateResult<()> {
        tracing::info!("External login cancelled");
        self.driver.navigate(&self.config.home_url).await.ok();
        self.state = SsoState::Cancelled;
        self.profile = None;
        Err(GateError::Cancelled)
    }
}
