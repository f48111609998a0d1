use log::LevelFilter;

use crate::{
    error::{RotatorError, RotatorResult},
    logger::Logger,
    storage::Storage,
};

/// Externally configurable knobs of the rotator engine.
#[derive(Clone)]
pub struct Options {
    /// Ordered registry of stream base names. A sealed segment is dispatched
    /// to the first base its name contains, so order matters.
    pub streams: Vec<String>,

    /// Depth of the generation ring. Generations live at indices
    /// `0..=max_generations`; filling the slot at `max_generations`
    /// triggers archival. Must be at least 1.
    pub max_generations: usize,

    /// Remove a stream's previous archive when a new one is produced.
    pub delete_prior_archive: bool,

    /// Remove the packaged generation files after a successful archive.
    pub delete_originals: bool,

    /// An external logger to plug in; when `None` the engine builds its own
    /// `slog` backend.
    pub logger: Option<slog::Logger>,

    /// Max verbosity of the engine log.
    pub logger_level: LevelFilter,
}

impl Default for Options {
    fn default() -> Self {
        Options {
            streams: vec![
                "ipstrc".to_owned(),
                "pdtrc".to_owned(),
                "ipmgr".to_owned(),
                "inttrc".to_owned(),
            ],
            max_generations: 5,
            delete_prior_archive: true,
            delete_originals: true,
            logger: None,
            logger_level: LevelFilter::Info,
        }
    }
}

impl Options {
    pub(crate) fn validate(&self) -> RotatorResult<()> {
        if self.streams.is_empty() {
            return Err(RotatorError::InvalidArgument(
                "stream registry must not be empty".to_owned(),
            ));
        }
        if self.max_generations < 1 {
            return Err(RotatorError::InvalidArgument(
                "max_generations must be at least 1".to_owned(),
            ));
        }
        Ok(())
    }

    /// Install the logging backend for the `log` facade macros.
    pub(crate) fn initialize<S: Storage>(&self, storage: &S, watch_dir: &str) {
        let logger = Logger::new(self.logger.clone(), self.logger_level, storage, watch_dir);
        // Ignore the error if a logger has been set already
        let _ = log::set_logger(Box::leak(Box::new(logger)));
        log::set_max_level(self.logger_level);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate() {
        assert!(Options::default().validate().is_ok());

        let no_streams = Options {
            streams: vec![],
            ..Options::default()
        };
        assert!(no_streams.validate().is_err());

        let zero_depth = Options {
            max_generations: 0,
            ..Options::default()
        };
        assert!(zero_depth.validate().is_err());
    }
}
