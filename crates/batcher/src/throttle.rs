//! DA throttling of the block builders.
//!
//! When too many DA bytes are waiting to be posted, the batcher asks the
//! sequencer's block builders to limit the DA size of transactions and
//! blocks. A [`ThrottleStrategy`] maps the backlog to an intensity in
//! `[0, 1]`, and [`ThrottleController`] turns the intensity into limits.

use std::{
    fmt,
    str::FromStr,
    sync::{Mutex, MutexGuard, PoisonError},
};

use tracing::warn;

use crate::error::BatcherError;

/// Default tx DA size limit at full intensity.
pub const DEFAULT_TX_SIZE_LOWER_LIMIT: u64 = 150;
/// Default tx DA size limit as intensity approaches zero.
pub const DEFAULT_TX_SIZE_UPPER_LIMIT: u64 = 20_000;
/// Default block DA size limit at full intensity.
pub const DEFAULT_BLOCK_SIZE_LOWER_LIMIT: u64 = 2_000;
/// Default block DA size limit when not throttling.
pub const DEFAULT_BLOCK_SIZE_UPPER_LIMIT: u64 = 130_000;
/// Default backlog at which throttling starts, enough for four 6-blob channels.
pub const DEFAULT_LOWER_THRESHOLD: u64 = 3_200_000;
/// Default backlog at which throttling is at full intensity.
pub const DEFAULT_UPPER_THRESHOLD: u64 = DEFAULT_LOWER_THRESHOLD * 4;

/// How the backlog maps to an intensity.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub enum ThrottleControllerType {
    /// Full intensity above the lower threshold.
    Step,
    /// Linear between the thresholds.
    Linear,
    /// Quadratic between the thresholds.
    #[default]
    Quadratic,
}

impl fmt::Display for ThrottleControllerType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Step => write!(f, "step"),
            Self::Linear => write!(f, "linear"),
            Self::Quadratic => write!(f, "quadratic"),
        }
    }
}

impl FromStr for ThrottleControllerType {
    type Err = BatcherError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "step" => Ok(Self::Step),
            "linear" => Ok(Self::Linear),
            "quadratic" => Ok(Self::Quadratic),
            _ => Err(BatcherError::InvalidConfig("unknown throttle controller type")),
        }
    }
}

/// Throttling thresholds and limits.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ThrottleConfig {
    /// Tx DA size limit at full intensity. Zero never limits transactions.
    pub tx_size_lower_limit: u64,
    /// Tx DA size limit as intensity approaches zero.
    pub tx_size_upper_limit: u64,
    /// Block DA size limit at full intensity. Zero never limits blocks.
    pub block_size_lower_limit: u64,
    /// Block DA size limit when not throttling.
    pub block_size_upper_limit: u64,
    /// Strategy mapping the backlog to an intensity.
    pub controller_type: ThrottleControllerType,
    /// Unsafe DA bytes above which throttling starts. Zero disables throttling.
    pub lower_threshold: u64,
    /// Unsafe DA bytes at which intensity is 1.
    pub upper_threshold: u64,
}

impl Default for ThrottleConfig {
    fn default() -> Self {
        Self {
            tx_size_lower_limit: DEFAULT_TX_SIZE_LOWER_LIMIT,
            tx_size_upper_limit: DEFAULT_TX_SIZE_UPPER_LIMIT,
            block_size_lower_limit: DEFAULT_BLOCK_SIZE_LOWER_LIMIT,
            block_size_upper_limit: DEFAULT_BLOCK_SIZE_UPPER_LIMIT,
            controller_type: ThrottleControllerType::default(),
            lower_threshold: DEFAULT_LOWER_THRESHOLD,
            upper_threshold: DEFAULT_UPPER_THRESHOLD,
        }
    }
}

impl ThrottleConfig {
    /// Returns a builder starting from the defaults.
    pub fn builder() -> ThrottleConfigBuilder {
        ThrottleConfigBuilder::default()
    }

    /// Returns `true` if the throttling loop should run.
    pub const fn is_enabled(&self) -> bool {
        self.lower_threshold > 0
    }

    /// Validates thresholds and limits.
    ///
    /// # Errors
    ///
    /// Returns [`BatcherError::InvalidConfig`] naming the first bad value.
    pub fn check(&self) -> Result<(), BatcherError> {
        if self.lower_threshold != 0 && self.upper_threshold <= self.lower_threshold {
            return Err(BatcherError::InvalidConfig(
                "throttle upper threshold must be greater than the lower threshold",
            ));
        }
        if self.block_size_lower_limit > 0
            && self.block_size_lower_limit >= self.block_size_upper_limit
        {
            return Err(BatcherError::InvalidConfig(
                "throttle block size lower limit must be less than the upper limit",
            ));
        }
        if self.tx_size_lower_limit > 0
            && self.controller_type != ThrottleControllerType::Step
            && self.tx_size_lower_limit >= self.tx_size_upper_limit
        {
            return Err(BatcherError::InvalidConfig(
                "throttle tx size lower limit must be less than the upper limit",
            ));
        }
        Ok(())
    }
}

/// Builder for [`ThrottleConfig`].
#[derive(Debug, Clone, Default)]
pub struct ThrottleConfigBuilder {
    config: ThrottleConfig,
}

impl ThrottleConfigBuilder {
    /// Sets the tx DA size limits.
    pub const fn tx_size_limits(mut self, lower: u64, upper: u64) -> Self {
        self.config.tx_size_lower_limit = lower;
        self.config.tx_size_upper_limit = upper;
        self
    }

    /// Sets the block DA size limits.
    pub const fn block_size_limits(mut self, lower: u64, upper: u64) -> Self {
        self.config.block_size_lower_limit = lower;
        self.config.block_size_upper_limit = upper;
        self
    }

    /// Sets the controller type.
    pub const fn controller_type(mut self, controller_type: ThrottleControllerType) -> Self {
        self.config.controller_type = controller_type;
        self
    }

    /// Sets the backlog thresholds.
    pub const fn thresholds(mut self, lower: u64, upper: u64) -> Self {
        self.config.lower_threshold = lower;
        self.config.upper_threshold = upper;
        self
    }

    /// Builds the config.
    pub const fn build(self) -> ThrottleConfig {
        self.config
    }
}

/// Limits pushed to the block builders.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct ThrottleParams {
    /// Max DA size of a transaction, zero for no limit.
    pub max_tx_size: u64,
    /// Max DA size of a block, zero for no limit.
    pub max_block_size: u64,
    /// Throttle intensity in `[0, 1]`.
    pub intensity: f64,
}

impl ThrottleParams {
    /// Returns `true` if any throttling is applied.
    pub fn is_throttling(&self) -> bool {
        self.intensity > 0.0
    }
}

/// Maps the DA backlog to a throttle intensity.
pub trait ThrottleStrategy: Send + fmt::Debug {
    /// Returns the intensity for `pending_bytes` of backlog.
    fn update(&mut self, pending_bytes: u64) -> f64;

    /// Forgets any internal state.
    fn reset(&mut self) {}

    /// The strategy kind.
    fn controller_type(&self) -> ThrottleControllerType;
}

/// Full intensity as soon as the backlog exceeds the threshold.
#[derive(Debug, Clone, Copy)]
pub struct StepStrategy {
    threshold: u64,
}

impl StepStrategy {
    /// Creates a step strategy.
    pub const fn new(threshold: u64) -> Self {
        Self { threshold }
    }
}

impl ThrottleStrategy for StepStrategy {
    fn update(&mut self, pending_bytes: u64) -> f64 {
        if pending_bytes > self.threshold { 1.0 } else { 0.0 }
    }

    fn controller_type(&self) -> ThrottleControllerType {
        ThrottleControllerType::Step
    }
}

fn linear_ratio(pending_bytes: u64, lower: u64, upper: u64) -> f64 {
    if pending_bytes <= lower {
        return 0.0;
    }
    if pending_bytes >= upper || upper <= lower {
        return 1.0;
    }
    (pending_bytes - lower) as f64 / (upper - lower) as f64
}

/// Intensity rises linearly from the lower to the upper threshold.
#[derive(Debug, Clone, Copy)]
pub struct LinearStrategy {
    lower_threshold: u64,
    upper_threshold: u64,
}

impl LinearStrategy {
    /// Creates a linear strategy.
    pub const fn new(lower_threshold: u64, upper_threshold: u64) -> Self {
        Self { lower_threshold, upper_threshold }
    }
}

impl ThrottleStrategy for LinearStrategy {
    fn update(&mut self, pending_bytes: u64) -> f64 {
        linear_ratio(pending_bytes, self.lower_threshold, self.upper_threshold)
    }

    fn controller_type(&self) -> ThrottleControllerType {
        ThrottleControllerType::Linear
    }
}

/// Intensity rises quadratically from the lower to the upper threshold.
#[derive(Debug, Clone, Copy)]
pub struct QuadraticStrategy {
    lower_threshold: u64,
    upper_threshold: u64,
}

impl QuadraticStrategy {
    /// Creates a quadratic strategy.
    pub const fn new(lower_threshold: u64, upper_threshold: u64) -> Self {
        Self { lower_threshold, upper_threshold }
    }
}

impl ThrottleStrategy for QuadraticStrategy {
    fn update(&mut self, pending_bytes: u64) -> f64 {
        let ratio = linear_ratio(pending_bytes, self.lower_threshold, self.upper_threshold);
        ratio * ratio
    }

    fn controller_type(&self) -> ThrottleControllerType {
        ThrottleControllerType::Quadratic
    }
}

/// Turns strategy output into [`ThrottleParams`] and remembers the latest.
#[derive(Debug)]
pub struct ThrottleController {
    config: ThrottleConfig,
    strategy: Mutex<Box<dyn ThrottleStrategy>>,
    current: Mutex<ThrottleParams>,
}

impl ThrottleController {
    /// Creates a controller with the strategy named in `config`.
    ///
    /// # Errors
    ///
    /// Returns [`BatcherError::InvalidConfig`] if `config` fails its check.
    pub fn new(config: ThrottleConfig) -> Result<Self, BatcherError> {
        config.check()?;
        let strategy: Box<dyn ThrottleStrategy> = match config.controller_type {
            ThrottleControllerType::Step => Box::new(StepStrategy::new(config.lower_threshold)),
            ThrottleControllerType::Linear => {
                Box::new(LinearStrategy::new(config.lower_threshold, config.upper_threshold))
            }
            ThrottleControllerType::Quadratic => {
                Box::new(QuadraticStrategy::new(config.lower_threshold, config.upper_threshold))
            }
        };
        Ok(Self::with_strategy(strategy, config))
    }

    /// Creates a controller around an explicit strategy.
    pub fn with_strategy(strategy: Box<dyn ThrottleStrategy>, config: ThrottleConfig) -> Self {
        Self {
            current: Mutex::new(Self::idle_params(&config)),
            config,
            strategy: Mutex::new(strategy),
        }
    }

    const fn idle_params(config: &ThrottleConfig) -> ThrottleParams {
        ThrottleParams { max_tx_size: 0, max_block_size: config.block_size_upper_limit, intensity: 0.0 }
    }

    fn current(&self) -> MutexGuard<'_, ThrottleParams> {
        self.current.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn strategy(&self) -> MutexGuard<'_, Box<dyn ThrottleStrategy>> {
        self.strategy.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// The config.
    pub const fn config(&self) -> &ThrottleConfig {
        &self.config
    }

    /// Feeds the current backlog and returns the new limits.
    pub fn update(&self, pending_bytes: u64) -> ThrottleParams {
        let (intensity, controller_type) = {
            let mut strategy = self.strategy();
            (strategy.update(pending_bytes), strategy.controller_type())
        };
        let params = self.intensity_to_params(intensity, controller_type);
        *self.current() = params;
        params
    }

    /// The limits from the latest update.
    pub fn load(&self) -> ThrottleParams {
        *self.current()
    }

    /// Resets the strategy and the limits.
    pub fn reset(&self) {
        self.strategy().reset();
        *self.current() = Self::idle_params(&self.config);
    }

    /// The strategy kind.
    pub fn controller_type(&self) -> ThrottleControllerType {
        self.strategy().controller_type()
    }

    fn intensity_to_params(
        &self,
        mut intensity: f64,
        controller_type: ThrottleControllerType,
    ) -> ThrottleParams {
        if intensity > 1.0 {
            warn!(intensity, "Throttle intensity above maximum, clamping");
            intensity = 1.0;
        }
        if intensity < 0.0 {
            warn!(intensity, "Throttle intensity below minimum, clamping");
            intensity = 0.0;
        }

        let cfg = &self.config;
        let interpolate = |lower: u64, upper: u64| {
            (upper as f64 - intensity * upper.saturating_sub(lower) as f64) as u64
        };
        let step = controller_type == ThrottleControllerType::Step;

        let max_tx_size = if cfg.tx_size_lower_limit == 0 || intensity == 0.0 {
            0
        } else if step {
            cfg.tx_size_lower_limit
        } else {
            interpolate(cfg.tx_size_lower_limit, cfg.tx_size_upper_limit)
        };

        let max_block_size = if cfg.block_size_lower_limit == 0 {
            0
        } else if intensity == 0.0 {
            cfg.block_size_upper_limit
        } else if step {
            cfg.block_size_lower_limit
        } else {
            interpolate(cfg.block_size_lower_limit, cfg.block_size_upper_limit)
        };

        ThrottleParams { max_tx_size, max_block_size, intensity }
    }
}
