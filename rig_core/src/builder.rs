//! Type-state builder for a connected `MotionPlanner`.
//!
//! `build()` only exists once a connector and an axis set were supplied;
//! `try_build()` only needs the connector and reports a missing axis set at
//! runtime.
//! Both open the link and run the startup sequence: wait for the board to
//! finish resetting, optionally energize the steppers, optionally select an
//! initial positioning mode.

use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

use rig_traits::Connector;
use rig_traits::clock::{Clock, MonotonicClock};

use crate::axis::AxisSet;
use crate::command::{LineEnding, Positioning};
use crate::error::{BuildError, Result};
use crate::planner::MotionPlanner;
use crate::protocol::{CommandProtocol, ProtocolSettings};
use crate::recovery::{ConnectionRecovery, RetryPolicy};

// ── Type-state markers ───────────────────────────────────────────────────────

/// No connector supplied yet.
pub struct NoConnector;
pub struct Missing;
pub struct Set;

pub struct RigBuilder<C, A> {
    connector: C,
    axes: Option<AxisSet>,
    policy: RetryPolicy,
    settings: ProtocolSettings,
    clock: Option<Arc<dyn Clock + Send + Sync>>,
    startup_delay: Duration,
    auto_enable: bool,
    initial_positioning: Option<Positioning>,
    _a: PhantomData<A>,
}

impl Default for RigBuilder<NoConnector, Missing> {
    fn default() -> Self {
        Self {
            connector: NoConnector,
            axes: None,
            policy: RetryPolicy::default(),
            settings: ProtocolSettings::default(),
            clock: None,
            startup_delay: Duration::ZERO,
            auto_enable: false,
            initial_positioning: None,
            _a: PhantomData,
        }
    }
}

impl RigBuilder<NoConnector, Missing> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Everything but the connector, taken from a validated config.
    pub fn from_config(
        cfg: &rig_config::Config,
    ) -> std::result::Result<RigBuilder<NoConnector, Set>, BuildError> {
        let axes = AxisSet::try_from(cfg.axes.as_slice())?;
        let mut b = Self::new()
            .with_axes(axes)
            .with_policy((&cfg.recovery).into())
            .with_settings((&cfg.motion).into())
            .startup_delay(Duration::from_millis(cfg.motion.startup_delay_ms))
            .auto_enable(cfg.motion.auto_enable);
        if let Some(mode) = cfg.motion.initial_positioning {
            b = b.initial_positioning(mode.into());
        }
        Ok(b)
    }
}

/// Chainable setters that do not affect type-state.
impl<C, A> RigBuilder<C, A> {
    pub fn with_policy(mut self, policy: RetryPolicy) -> Self {
        self.policy = policy;
        self
    }
    pub fn with_settings(mut self, settings: ProtocolSettings) -> Self {
        self.settings = settings;
        self
    }
    pub fn line_ending(mut self, ending: LineEnding) -> Self {
        self.settings.line_ending = ending;
        self
    }
    pub fn response_timeout(mut self, timeout: Duration) -> Self {
        self.settings.response_timeout = timeout;
        self
    }
    /// Pause after opening the port; most boards reset when the port opens.
    pub fn startup_delay(mut self, delay: Duration) -> Self {
        self.startup_delay = delay;
        self
    }
    /// Send M17 once connected.
    pub fn auto_enable(mut self, enable: bool) -> Self {
        self.auto_enable = enable;
        self
    }
    pub fn initial_positioning(mut self, mode: Positioning) -> Self {
        self.initial_positioning = Some(mode);
        self
    }
    /// Defaults to `MonotonicClock`.
    pub fn with_clock(mut self, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        self.clock = Some(clock);
        self
    }
}

// Setters that advance type-state
impl<C, A> RigBuilder<C, A> {
    pub fn with_connector<K: Connector>(self, connector: K) -> RigBuilder<K, A> {
        RigBuilder {
            connector,
            axes: self.axes,
            policy: self.policy,
            settings: self.settings,
            clock: self.clock,
            startup_delay: self.startup_delay,
            auto_enable: self.auto_enable,
            initial_positioning: self.initial_positioning,
            _a: PhantomData,
        }
    }
}

impl<C> RigBuilder<C, Missing> {
    pub fn with_axes(self, axes: AxisSet) -> RigBuilder<C, Set> {
        RigBuilder {
            connector: self.connector,
            axes: Some(axes),
            policy: self.policy,
            settings: self.settings,
            clock: self.clock,
            startup_delay: self.startup_delay,
            auto_enable: self.auto_enable,
            initial_positioning: self.initial_positioning,
            _a: PhantomData,
        }
    }
}

impl<C: Connector, A> RigBuilder<C, A> {
    /// Fallible build available in any axis state.
    pub fn try_build(self) -> Result<MotionPlanner<C>> {
        let axes = self.axes.ok_or(BuildError::MissingAxes)?;
        if self.policy.max_attempts == 0 {
            return Err(BuildError::InvalidConfig("max_attempts must be >= 1").into());
        }
        if self.settings.response_timeout.is_zero() {
            return Err(BuildError::InvalidConfig("response_timeout must be > 0").into());
        }
        let clock: Arc<dyn Clock + Send + Sync> = match self.clock {
            Some(c) => c,
            None => Arc::new(MonotonicClock::new()),
        };

        let link = ConnectionRecovery::open(self.connector, self.policy, clock.clone())?;
        tracing::info!(target = %link.target(), axes = axes.len(), "motion link open");
        if !self.startup_delay.is_zero() {
            tracing::debug!(delay = ?self.startup_delay, "waiting for controller reset");
            clock.sleep(self.startup_delay);
        }

        let mut protocol = CommandProtocol::new(link, axes, self.settings, clock);
        if self.auto_enable {
            protocol.enable_steppers()?;
        }
        if let Some(mode) = self.initial_positioning {
            protocol.set_positioning(mode)?;
        }
        Ok(MotionPlanner::new(protocol))
    }
}

impl<C: Connector> RigBuilder<C, Set> {
    /// Connect and run the startup sequence.
    pub fn build(self) -> Result<MotionPlanner<C>> {
        self.try_build()
    }
}
