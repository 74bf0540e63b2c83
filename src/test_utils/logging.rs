use std::time::Instant;

/// Bracketed, timestamped progress output for long-running tests.
pub struct TestLogger {
    test_name: String,
    start_time: Instant,
    steps: usize,
}

impl TestLogger {
    pub fn new(test_name: &str) -> Self {
        let separator = "=".repeat(60);
        println!("\n{separator}");
        println!("[TEST START] {test_name}");
        println!("{separator}");
        Self {
            test_name: test_name.to_string(),
            start_time: Instant::now(),
            steps: 0,
        }
    }

    pub fn step(&mut self, description: &str) {
        self.steps += 1;
        println!(
            "[STEP {}] {description} (+{:?})",
            self.steps,
            self.start_time.elapsed()
        );
    }

    pub fn log_input<T: std::fmt::Debug>(&self, name: &str, value: &T) {
        println!("[INPUT] {name}: {value:?}");
    }

    pub fn log_expected<T: std::fmt::Debug>(&self, value: &T) {
        println!("[EXPECTED] {value:?}");
    }

    pub fn log_actual<T: std::fmt::Debug>(&self, value: &T) {
        println!("[ACTUAL] {value:?}");
    }

    pub fn pass(&self) {
        println!(
            "[RESULT] {} PASSED in {:?} after {} steps",
            self.test_name,
            self.start_time.elapsed(),
            self.steps
        );
        println!("{}\n", "=".repeat(60));
    }

    pub fn test_name(&self) -> &str {
        &self.test_name
    }
}
