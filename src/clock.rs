/// Step counter and model time of a session.
///
/// Model time is rebuilt from the number of sub-steps taken at the current
/// step size instead of being summed tick by tick, so a run at a fixed step
/// size reads exactly `steps * step_size`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SimulationClock {
    step_count: u64,
    simulated_time: f64,
    // Time reached before the current step size took effect
    segment_origin: f64,
    segment_steps: u64,
    segment_step_size: f64,
}

impl SimulationClock {
    pub fn step_count(&self) -> u64 {
        self.step_count
    }

    pub fn simulated_time(&self) -> f64 {
        self.simulated_time
    }

    /// Accounts for one tick of `batch_size` sub-steps of `step_size` each.
    pub fn advance(&mut self, batch_size: u32, step_size: f32) {
        let step_size = f64::from(step_size);
        if step_size != self.segment_step_size {
            self.segment_origin = self.simulated_time;
            self.segment_steps = 0;
            self.segment_step_size = step_size;
        }
        self.segment_steps += u64::from(batch_size);
        self.step_count += u64::from(batch_size);
        self.simulated_time = self.segment_origin + self.segment_steps as f64 * step_size;
    }

    /// Zeroes the step count only; model time keeps running.
    pub fn restart_step_count(&mut self) {
        self.step_count = 0;
    }
}
