//! Discrete PID position law with error low-pass and output clamping.

/// PID gains and limits.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PidGains {
    pub kp: f64,
    pub ki: f64,
    pub kd: f64,
    /// First-order IIR constant applied to the error; 1.0 = unfiltered.
    pub low_pass: f64,
    pub min_output: f64,
    pub max_output: f64,
}

/// Stateful PID controller sampled at a fixed interval.
///
/// The error is low-passed first, then the proportional, integral and
/// derivative terms all act on the filtered error. The integral is frozen
/// while the output is pinned against a limit in the direction the error
/// would push it further.
#[derive(Debug, Clone)]
pub struct PidController {
    gains: PidGains,
    dt: f64,
    integral: f64,
    previous_error: f64,
    initialized: bool,
    last_output: f64,
}

impl PidController {
    /// `dt` is the sample period in seconds.
    pub fn new(gains: PidGains, dt: f64) -> Self {
        Self {
            gains,
            dt,
            integral: 0.0,
            previous_error: 0.0,
            initialized: false,
            last_output: 0.0,
        }
    }

    pub fn gains(&self) -> &PidGains {
        &self.gains
    }

    pub fn integral(&self) -> f64 {
        self.integral
    }

    pub fn last_output(&self) -> f64 {
        self.last_output
    }

    /// Run one sample and return the clamped output.
    pub fn update(&mut self, setpoint: f64, measured: f64) -> f64 {
        let g = self.gains;
        let raw_error = setpoint - measured;

        let error = if self.initialized {
            g.low_pass * raw_error + (1.0 - g.low_pass) * self.previous_error
        } else {
            // Seed the filter and derivative so the first sample has no kick.
            self.previous_error = raw_error;
            self.initialized = true;
            raw_error
        };

        let derivative = (error - self.previous_error) / self.dt;
        let candidate_integral = self.integral + error * self.dt;

        let unclamped = g.kp * error + g.ki * candidate_integral + g.kd * derivative;
        let output = unclamped.clamp(g.min_output, g.max_output);

        let pushing_high = unclamped > g.max_output && error > 0.0;
        let pushing_low = unclamped < g.min_output && error < 0.0;
        if !(pushing_high || pushing_low) {
            self.integral = candidate_integral;
        }

        self.previous_error = error;
        self.last_output = output;
        output
    }

    pub fn reset(&mut self) {
        self.integral = 0.0;
        self.previous_error = 0.0;
        self.initialized = false;
        self.last_output = 0.0;
    }
}
