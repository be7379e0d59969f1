/// Monotonic counter of numeric handles. A value is never handed out twice.
#[derive(Debug)]
pub struct IdCounter {
    value: u32,
}

impl IdCounter {
    pub fn starting_at(value: u32) -> Self {
        Self { value }
    }

    #[inline]
    pub fn next(&mut self) -> u32 {
        let value = self.value;
        self.value += 1;
        value
    }

    #[inline]
    pub fn peek(&self) -> u32 {
        self.value
    }
}

impl Default for IdCounter {
    fn default() -> Self {
        Self::starting_at(1)
    }
}
