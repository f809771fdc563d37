use std::time::Duration;

use futures::Stream;
use rand::prelude::*;
use tokio::time::{interval, Interval, MissedTickBehavior};

use crate::config::SourceConfig;
use crate::error::PoolError;
use crate::job::{Job, JobId};

/// Decides how long each product keeps its fixture busy.
pub trait DurationModel: Send {
    fn duration_for(&mut self, id: JobId) -> Duration;
}

impl<F> DurationModel for F
where
    F: FnMut(JobId) -> Duration + Send,
{
    fn duration_for(&mut self, id: JobId) -> Duration {
        self(id)
    }
}

/// Every product takes the same time.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FixedDuration(pub Duration);

impl DurationModel for FixedDuration {
    fn duration_for(&mut self, _id: JobId) -> Duration {
        self.0
    }
}

/// Whole-second durations drawn uniformly from an inclusive range.
#[derive(Debug)]
pub struct UniformSeconds {
    rng: StdRng,
    min_secs: u64,
    max_secs: u64,
}

impl UniformSeconds {
    pub fn new(min_secs: u64, max_secs: u64, seed: Option<u64>) -> Result<Self, PoolError> {
        if min_secs > max_secs {
            return Err(PoolError::InvalidConfig(format!(
                "duration range is empty: {min_secs}s > {max_secs}s"
            )));
        }
        let rng = match seed {
            Some(s) => StdRng::seed_from_u64(s),
            None => StdRng::from_entropy(),
        };
        Ok(Self {
            rng,
            min_secs,
            max_secs,
        })
    }

    /// Build from the millisecond range in `config`, keeping the whole
    /// seconds that fall inside it.
    pub fn from_config(config: &SourceConfig) -> Result<Self, PoolError> {
        config.validate()?;
        let min_secs = config.min_duration_ms.div_ceil(1000);
        let max_secs = config.max_duration_ms / 1000;
        Self::new(min_secs, max_secs, config.seed)
    }
}

impl DurationModel for UniformSeconds {
    fn duration_for(&mut self, _id: JobId) -> Duration {
        Duration::from_secs(self.rng.gen_range(self.min_secs..=self.max_secs))
    }
}

/// Generates products with increasing ids at a fixed cadence.
#[derive(Debug)]
pub struct JobSource<M> {
    next_id: JobId,
    interval: Duration,
    model: M,
}

impl<M: DurationModel> JobSource<M> {
    pub fn new(config: &SourceConfig, model: M) -> Self {
        Self {
            next_id: JobId(config.first_id),
            interval: config.arrival_interval(),
            model,
        }
    }

    /// Produce the next job immediately, ignoring the cadence.
    pub fn next_job(&mut self) -> Job {
        let id = self.next_id;
        self.next_id = id.next();
        let duration = self.model.duration_for(id);
        Job::new(id, duration)
    }

    /// Endless stream of jobs, one per arrival interval. The first job is
    /// yielded right away. A zero interval yields without pausing.
    pub fn into_stream(self) -> impl Stream<Item = Job>
    where
        M: 'static,
    {
        futures::stream::unfold(
            (self, None::<Interval>),
            |(mut source, mut ticker)| async move {
                if !source.interval.is_zero() {
                    let ticker = ticker.get_or_insert_with(|| {
                        let mut ticker = interval(source.interval);
                        // A saturated pool stalls the consumer; keep the
                        // spacing instead of bursting to catch up.
                        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
                        ticker
                    });
                    ticker.tick().await;
                }
                let job = source.next_job();
                Some((job, (source, ticker)))
            },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;

    #[test]
    fn test_ids_increase_from_first_id() {
        let config = SourceConfig {
            first_id: 5,
            ..SourceConfig::default()
        };
        let mut source = JobSource::new(&config, FixedDuration(Duration::from_secs(1)));
        let ids: Vec<_> = (0..3).map(|_| source.next_job().id()).collect();
        assert_eq!(ids, vec![JobId(5), JobId(6), JobId(7)]);
    }

    #[test]
    fn test_uniform_seconds_stay_in_range() {
        let mut model = UniformSeconds::from_config(&SourceConfig::default().with_seed(7))
            .expect("valid range");
        for n in 0..200 {
            let secs = model.duration_for(JobId(n)).as_secs();
            assert!((3..=6).contains(&secs), "duration {secs}s out of range");
        }
    }

    #[test]
    fn test_seeded_models_repeat() {
        let config = SourceConfig::default().with_seed(42);
        let mut a = UniformSeconds::from_config(&config).unwrap();
        let mut b = UniformSeconds::from_config(&config).unwrap();
        for n in 0..20 {
            assert_eq!(a.duration_for(JobId(n)), b.duration_for(JobId(n)));
        }
    }

    #[test]
    fn test_range_without_whole_second_is_rejected() {
        let config = SourceConfig::default().with_duration_range(1200, 1800);
        let err = UniformSeconds::from_config(&config).unwrap_err();
        assert!(matches!(err, PoolError::InvalidConfig(_)));
    }

    #[test]
    fn test_closure_model() {
        let config = SourceConfig::default();
        let mut source = JobSource::new(&config, |id: JobId| Duration::from_millis(id.0 * 10));
        assert_eq!(source.next_job().duration(), Duration::from_millis(10));
        assert_eq!(source.next_job().duration(), Duration::from_millis(20));
    }

    #[tokio::test(start_paused = true)]
    async fn test_stream_follows_arrival_interval() {
        let config = SourceConfig::default().with_interval(1000);
        let source = JobSource::new(&config, FixedDuration(Duration::from_secs(3)));
        let start = tokio::time::Instant::now();

        let jobs: Vec<_> = source.into_stream().take(3).collect().await;
        assert_eq!(jobs.len(), 3);
        assert_eq!(jobs[2].id(), JobId(3));

        let elapsed = start.elapsed();
        assert!(elapsed >= Duration::from_secs(2));
        assert!(elapsed < Duration::from_millis(2100));
    }

    #[tokio::test]
    async fn test_zero_interval_does_not_wait() {
        let config = SourceConfig::default().with_interval(0);
        let source = JobSource::new(&config, FixedDuration(Duration::ZERO));
        let jobs: Vec<_> = tokio::time::timeout(
            Duration::from_secs(1),
            source.into_stream().take(100).collect::<Vec<_>>(),
        )
        .await
        .expect("zero interval stream is immediate");
        assert_eq!(jobs.len(), 100);
    }
}
