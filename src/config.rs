/// Knobs of the Clite pipeline.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Config {
    /// Whether assigning a `float` to an `int` variable is accepted (and
    /// truncated at run time).
    pub narrowing: bool,
}

impl Config {
    /// A configuration that only accepts widening assignments.
    pub fn strict() -> Config {
        Config { narrowing: false }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config { narrowing: true }
    }
}
