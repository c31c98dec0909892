//! Fixed-step simulation clock.

/// Simulated time derived from the step index, so long runs do not
/// accumulate floating-point drift from repeated `+= dt`.
#[derive(Debug, Clone)]
pub struct SimClock {
    dt: f64,
    step: usize,
}

impl SimClock {
    pub fn new(dt: f64) -> Self {
        Self { dt, step: 0 }
    }

    pub fn dt(&self) -> f64 {
        self.dt
    }

    pub fn step_index(&self) -> usize {
        self.step
    }

    pub fn now(&self) -> f64 {
        self.time_at(self.step)
    }

    pub fn time_at(&self, step: usize) -> f64 {
        step as f64 * self.dt
    }

    pub fn advance(&mut self) {
        self.step += 1;
    }
}
