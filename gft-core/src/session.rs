//! Per-invocation settings handed to the orchestrators.
//!
//! Verbosity and progress reporting are passed in explicitly; nothing in the
//! codecs reads process-wide state.

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Verbosity {
    Quiet,
    #[default]
    Normal,
    Verbose,
}

/// One running progress indicator.
pub trait Tick {
    fn inc(&self, n: u64);
    fn finish(&self);
}

/// Progress collaborator. `batch` counts items, `bytes` counts payload bytes.
pub trait Progress {
    fn batch(&self, label: &str, total: u64) -> Box<dyn Tick>;
    fn bytes(&self, label: &str, total: u64) -> Box<dyn Tick>;
}

/// Reports nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct Silent;

struct NoTick;

impl Tick for NoTick {
    fn inc(&self, _n: u64) {}
    fn finish(&self) {}
}

impl Progress for Silent {
    fn batch(&self, _label: &str, _total: u64) -> Box<dyn Tick> {
        Box::new(NoTick)
    }
    fn bytes(&self, _label: &str, _total: u64) -> Box<dyn Tick> {
        Box::new(NoTick)
    }
}

pub struct Session<'a> {
    pub verbosity: Verbosity,
    pub progress: &'a dyn Progress,
}

impl<'a> Session<'a> {
    pub fn new(verbosity: Verbosity, progress: &'a dyn Progress) -> Self {
        Self {
            verbosity,
            progress,
        }
    }

    pub fn silent() -> Session<'static> {
        Session {
            verbosity: Verbosity::Quiet,
            progress: &Silent,
        }
    }

    pub fn verbose(&self) -> bool {
        self.verbosity == Verbosity::Verbose
    }
}
