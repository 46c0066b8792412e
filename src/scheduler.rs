use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use log::{debug, error, info, warn};
use time::OffsetDateTime;

use crate::config::{Config, TemperatureDisplay};
use crate::display::{Display, WIDTH};
use crate::geometry;
use crate::render::Renderer;
use crate::trend::TrendAccumulator;
use crate::weather::{FetchError, Observation, Scale, WeatherSource};
use crate::Result;

/// Source of wall-clock time and the only way the loop waits.
pub trait Clock {
    fn now(&self) -> OffsetDateTime;

    fn sleep(&self, duration: Duration);
}

#[derive(Clone, Copy, Debug, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> OffsetDateTime {
        OffsetDateTime::now_utc()
    }

    fn sleep(&self, duration: Duration) {
        thread::sleep(duration);
    }
}

/// Bounded retry for transient fetch failures, with a fixed pause between attempts.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct RetryPolicy {
    pub attempts: u32,
    pub backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 10,
            backoff: Duration::from_secs(10),
        }
    }
}

impl RetryPolicy {
    /// Call `operation` until it succeeds, fails with a non-transient error, runs out of
    /// attempts, or `running` is cleared. The last error is returned.
    pub fn run<T, F>(
        &self,
        clock: &impl Clock,
        running: &AtomicBool,
        mut operation: F,
    ) -> std::result::Result<T, FetchError>
    where
        F: FnMut() -> std::result::Result<T, FetchError>,
    {
        let mut attempt = 1;

        loop {
            match operation() {
                Ok(value) => {
                    if attempt > 1 {
                        info!("Took {} retries to get weather.", attempt - 1);
                    }
                    return Ok(value);
                }
                Err(e)
                    if e.is_transient()
                        && attempt < self.attempts
                        && running.load(Ordering::SeqCst) =>
                {
                    warn!("Attempt {} of {} failed: {}", attempt, self.attempts, e);
                    clock.sleep(self.backoff);
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

#[derive(Clone, Debug, PartialEq)]
pub struct Settings {
    pub poll_interval_secs: u64,
    pub reset_window_minutes: u64,
    pub scale: Scale,
    pub temperature_display: TemperatureDisplay,
    pub max_wind_speed: f64,
    pub retry: RetryPolicy,
}

impl From<&Config> for Settings {
    fn from(config: &Config) -> Self {
        Self {
            poll_interval_secs: config.poll_interval_secs,
            reset_window_minutes: config.reset_window_minutes,
            scale: config.scale,
            temperature_display: config.temperature_display,
            max_wind_speed: config.scale.max_wind_speed(),
            retry: RetryPolicy::default(),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Tick {
    /// New data was requested before the heartbeat ran.
    Refresh,
    /// Only the heartbeat ran.
    Idle,
}

/// The display loop. Each tick refreshes the data when the wall clock lands on a multiple of
/// the poll interval, then runs one back-and-forth heartbeat sweep. The sweep's pulse delays
/// are what paces the loop.
///
/// A rejected request is fatal only until the first reading arrives. After that every fetch
/// failure leaves the previous readings on screen.
pub struct Scheduler<S, D, C> {
    source: S,
    renderer: Renderer<D, C>,
    clock: C,
    settings: Settings,
    trend: TrendAccumulator,
    running: Arc<AtomicBool>,
    observation: Option<Observation>,
    last_refresh: Option<i64>,
}

impl<S: WeatherSource, D: Display, C: Clock> Scheduler<S, D, C> {
    pub fn new(
        source: S,
        renderer: Renderer<D, C>,
        clock: C,
        settings: Settings,
        running: Arc<AtomicBool>,
    ) -> Self {
        let trend = TrendAccumulator::new(
            settings.poll_interval_secs,
            settings.reset_window_minutes,
            clock.now(),
        );

        Self {
            source,
            renderer,
            clock,
            settings,
            trend,
            running,
            observation: None,
            last_refresh: None,
        }
    }

    pub fn renderer(&self) -> &Renderer<D, C> {
        &self.renderer
    }

    pub fn trend(&self) -> &TrendAccumulator {
        &self.trend
    }

    /// The most recent observation that made it onto the display.
    pub fn observation(&self) -> Option<&Observation> {
        self.observation.as_ref()
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Run until the shutdown flag is cleared or a fatal error occurs. The display is blanked
    /// on the way out either way.
    pub fn run(&mut self) -> Result<()> {
        let result = self.run_until_stopped();

        let shutdown = self.renderer.clear_all().and_then(|_| self.renderer.off());
        match (result, shutdown) {
            (Err(e), Err(shutdown_error)) => {
                warn!("Unable to clear the display: {}", shutdown_error);
                Err(e)
            }
            (Ok(()), Err(shutdown_error)) => Err(shutdown_error),
            (result, Ok(())) => result,
        }
    }

    fn run_until_stopped(&mut self) -> Result<()> {
        self.start()?;

        while self.is_running() {
            self.tick()?;
        }

        Ok(())
    }

    /// Show data straight away instead of waiting for the first poll boundary.
    pub fn start(&mut self) -> Result<()> {
        self.last_refresh = Some(self.clock.now().unix_timestamp());
        self.refresh()?;
        self.redraw_wind_bar()
    }

    pub fn tick(&mut self) -> Result<Tick> {
        let now = self.clock.now().unix_timestamp();

        let tick = if self.refresh_due(now) {
            self.last_refresh = Some(now);
            self.refresh()?;
            Tick::Refresh
        } else {
            Tick::Idle
        };

        for (position, direction) in geometry::heartbeat_sweep() {
            if !self.is_running() {
                break;
            }
            self.renderer.pulse_heartbeat(position, direction)?;
        }

        Ok(tick)
    }

    /// Whether `unix_seconds` is a poll boundary that hasn't been serviced yet. A sweep is
    /// shorter than a second, so the same boundary can come up twice.
    pub fn refresh_due(&self, unix_seconds: i64) -> bool {
        let interval = self.settings.poll_interval_secs.max(1) as i64;
        unix_seconds.rem_euclid(interval) == 0 && self.last_refresh != Some(unix_seconds)
    }

    fn refresh(&mut self) -> Result<()> {
        let source = &mut self.source;
        let fetched = self
            .settings
            .retry
            .run(&self.clock, &self.running, || source.fetch());

        match fetched {
            Ok(observation) => self.update(observation),
            // Once a reading has come through, the station and key are known to be good.
            Err(e @ FetchError::AuthFailure(_)) if self.observation.is_none() => Err(e.into()),
            Err(e) => {
                error!("{}; keeping previous readings", e);
                Ok(())
            }
        }
    }

    fn update(&mut self, observation: Observation) -> Result<()> {
        let direction = self.trend.record(observation.temperature, self.clock.now());
        let scale = self.settings.scale;
        let shown = match self.settings.temperature_display {
            TemperatureDisplay::Actual => observation.temperature,
            TemperatureDisplay::FeelsLike => observation.feels_like,
        };

        debug!("Current temp {} {}", observation.temperature, scale);
        debug!("Average temp {:?} {}", self.trend.average(), scale);
        debug!("Feels like {} {}", observation.feels_like, scale);
        debug!("Wind speed: {}", observation.wind_speed);
        debug!("Wind gusts: {}", observation.wind_gust);

        self.observation = Some(observation);
        self.redraw_wind_bar()?;

        if geometry::trend_glyph_suppressed(shown) {
            debug!("No room for the trend arrow next to {}", shown);
        } else {
            self.renderer.draw_trend(direction)?;
        }

        let glyph = geometry::temperature_glyph(shown, scale);
        info!(
            "Actual temp {} Feels like temp {} {}",
            geometry::temperature_glyph(observation.temperature, scale),
            geometry::temperature_glyph(observation.feels_like, scale),
            direction.symbol()
        );

        self.renderer
            .draw_temperature(&glyph, geometry::temperature_clear_width(shown))
    }

    fn redraw_wind_bar(&mut self) -> Result<()> {
        let observation = match self.observation {
            Some(observation) => observation,
            None => return Ok(()),
        };

        let bar = geometry::wind_bar(
            observation.wind_speed,
            observation.wind_gust,
            self.settings.max_wind_speed,
            WIDTH,
        );
        debug!(
            "Wind multiplier: {}",
            WIDTH as f64 / self.settings.max_wind_speed
        );
        debug!("Wind speed, calc {} {}", observation.wind_speed, bar.speed_pixels);
        debug!("Wind gusts, calc {} {:?}", observation.wind_gust, bar.gust_pixel);

        self.renderer.draw_wind_bar(bar)
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::render::tests::MemoryDisplay;
    use crate::render::{Timing, BRIGHT, GUST_BRIGHTNESS, WIND_BRIGHTNESS};
    use crate::Error;
    use std::cell::{Cell, RefCell};
    use std::collections::VecDeque;
    use std::rc::Rc;

    /// Clock that only moves when something sleeps.
    #[derive(Clone)]
    pub struct FakeClock {
        now: Rc<Cell<OffsetDateTime>>,
        sleeps: Rc<RefCell<Vec<Duration>>>,
    }

    impl FakeClock {
        pub fn at(unix_seconds: i64) -> Self {
            Self {
                now: Rc::new(Cell::new(
                    OffsetDateTime::UNIX_EPOCH + time::Duration::seconds(unix_seconds),
                )),
                sleeps: Rc::default(),
            }
        }

        pub fn sleeps(&self) -> Vec<Duration> {
            self.sleeps.borrow().clone()
        }

        pub fn set(&self, unix_seconds: i64) {
            self.now
                .set(OffsetDateTime::UNIX_EPOCH + time::Duration::seconds(unix_seconds));
        }
    }

    impl Clock for FakeClock {
        fn now(&self) -> OffsetDateTime {
            self.now.get()
        }

        fn sleep(&self, duration: Duration) {
            self.sleeps.borrow_mut().push(duration);
            self.now.set(self.now.get() + duration);
        }
    }

    struct ScriptedSource {
        script: VecDeque<std::result::Result<Observation, FetchError>>,
        calls: Rc<Cell<usize>>,
        // Cleared once the script runs out, ending `Scheduler::run`.
        stop: Option<Arc<AtomicBool>>,
    }

    impl ScriptedSource {
        fn new(script: Vec<std::result::Result<Observation, FetchError>>) -> Self {
            Self {
                script: script.into(),
                calls: Rc::default(),
                stop: None,
            }
        }
    }

    impl WeatherSource for ScriptedSource {
        fn fetch(&mut self) -> std::result::Result<Observation, FetchError> {
            self.calls.set(self.calls.get() + 1);
            self.script.pop_front().unwrap_or_else(|| {
                if let Some(running) = &self.stop {
                    running.store(false, Ordering::SeqCst);
                }
                Err(FetchError::SourceUnavailable("script over".into()))
            })
        }

        fn describe(&self) -> String {
            "script".to_string()
        }
    }

    fn reading(temperature: f64) -> Observation {
        Observation {
            temperature,
            feels_like: temperature,
            wind_speed: 10.,
            wind_gust: 20.,
        }
    }

    fn settings() -> Settings {
        Settings {
            poll_interval_secs: 180,
            reset_window_minutes: 60,
            scale: Scale::Fahrenheit,
            temperature_display: TemperatureDisplay::Actual,
            max_wind_speed: 75.,
            retry: RetryPolicy {
                attempts: 3,
                backoff: Duration::from_secs(10),
            },
        }
    }

    fn scheduler(
        source: ScriptedSource,
        clock: &FakeClock,
    ) -> Scheduler<ScriptedSource, MemoryDisplay, FakeClock> {
        let renderer =
            Renderer::new(MemoryDisplay::default(), clock.clone(), Timing::default()).unwrap();
        Scheduler::new(
            source,
            renderer,
            clock.clone(),
            settings(),
            Arc::new(AtomicBool::new(true)),
        )
    }

    #[test]
    fn retry_gives_up_after_bounded_attempts() {
        let clock = FakeClock::at(0);
        let running = AtomicBool::new(true);
        let mut calls = 0;

        let result: std::result::Result<(), _> =
            RetryPolicy::default().run(&clock, &running, || {
                calls += 1;
                Err(FetchError::SourceUnavailable("timeout".into()))
            });

        assert!(matches!(result, Err(FetchError::SourceUnavailable(_))));
        assert_eq!(10, calls);
        assert_eq!(vec![Duration::from_secs(10); 9], clock.sleeps());
    }

    #[test]
    fn retry_recovers_from_transient_failure() {
        let clock = FakeClock::at(0);
        let running = AtomicBool::new(true);
        let mut calls = 0;

        let result = RetryPolicy::default().run(&clock, &running, || {
            calls += 1;
            if calls < 3 {
                Err(FetchError::SourceUnavailable("reset".into()))
            } else {
                Ok(calls)
            }
        });

        assert_eq!(3, result.unwrap());
        assert_eq!(2, clock.sleeps().len());
    }

    #[test]
    fn retry_skips_permanent_failures() {
        let clock = FakeClock::at(0);
        let running = AtomicBool::new(true);

        for error in vec![
            FetchError::AuthFailure("401".into()),
            FetchError::MalformedPayload("no temp".into()),
        ] {
            let mut error = Some(error);
            let result: std::result::Result<(), _> =
                RetryPolicy::default().run(&clock, &running, || Err(error.take().unwrap()));
            assert!(result.is_err());
        }
        assert!(clock.sleeps().is_empty());
    }

    #[test]
    fn retry_stops_when_shutting_down() {
        let clock = FakeClock::at(0);
        let running = AtomicBool::new(false);
        let mut calls = 0;

        let result: std::result::Result<(), _> =
            RetryPolicy::default().run(&clock, &running, || {
                calls += 1;
                Err(FetchError::SourceUnavailable("timeout".into()))
            });

        assert!(result.is_err());
        assert_eq!(1, calls);
    }

    #[test]
    fn refresh_is_due_once_per_boundary() {
        let clock = FakeClock::at(0);
        let mut scheduler = scheduler(ScriptedSource::new(vec![Ok(reading(60.))]), &clock);

        assert!(scheduler.refresh_due(360));
        assert!(!scheduler.refresh_due(361));
        assert!(!scheduler.refresh_due(179));

        scheduler.start().unwrap();
        assert!(!scheduler.refresh_due(0));
        assert!(scheduler.refresh_due(180));
    }

    #[test]
    fn tick_refreshes_on_boundary_then_sweeps() {
        let clock = FakeClock::at(179);
        let source = ScriptedSource::new(vec![Ok(reading(60.)), Ok(reading(61.))]);
        let calls = source.calls.clone();
        let mut scheduler = scheduler(source, &clock);

        scheduler.start().unwrap();
        assert_eq!(1, calls.get());

        clock.set(179);
        assert_eq!(Tick::Idle, scheduler.tick().unwrap());
        clock.set(180);
        assert_eq!(Tick::Refresh, scheduler.tick().unwrap());
        assert_eq!(2, calls.get());
        assert_eq!(Tick::Idle, scheduler.tick().unwrap());

        // Temperature dwell comes before the eight heartbeat pulses.
        let sleeps = clock.sleeps();
        let tail = &sleeps[sleeps.len() - 17..];
        assert_eq!(Duration::from_secs(1), tail[0]);
        assert!(tail[1..]
            .iter()
            .all(|sleep| *sleep == Duration::from_millis(50)));
    }

    #[test]
    fn refresh_draws_every_region() {
        let clock = FakeClock::at(0);
        let mut scheduler = scheduler(ScriptedSource::new(vec![Ok(reading(72.))]), &clock);
        scheduler.start().unwrap();

        let canvas = scheduler.renderer().canvas();
        let mut expected = crate::display::Canvas::new();
        expected.write_string("72F", 0, 0, &crate::display::FONT_3X5, BRIGHT);
        assert!((0..5).all(|y| (0..WIDTH).all(|x| canvas.get_pixel(x, y)
            == expected.get_pixel(x, y))));

        assert_eq!(WIND_BRIGHTNESS, canvas.get_pixel(1, 6));
        assert_eq!(0., canvas.get_pixel(2, 6));
        assert_eq!(GUST_BRIGHTNESS, canvas.get_pixel(3, 6));
        assert_eq!(Some(&reading(72.)), scheduler.observation());
    }

    #[test]
    fn falling_temperature_draws_down_arrow() {
        let clock = FakeClock::at(0);
        let source = ScriptedSource::new(vec![
            Ok(reading(70.)),
            Ok(reading(72.)),
            Ok(reading(68.)),
        ]);
        let mut scheduler = scheduler(source, &clock);

        scheduler.start().unwrap();
        clock.set(180);
        scheduler.tick().unwrap();
        assert_eq!(BRIGHT, scheduler.renderer().canvas().get_pixel(14, 1));

        clock.set(360);
        scheduler.tick().unwrap();
        let canvas = scheduler.renderer().canvas();
        assert_eq!(BRIGHT, canvas.get_pixel(14, 3));
        assert_eq!(0., canvas.get_pixel(14, 1));
        assert_eq!(Some(70.), scheduler.trend().average());
    }

    #[test]
    fn hot_reading_hides_trend_arrow() {
        let clock = FakeClock::at(0);
        let source = ScriptedSource::new(vec![Ok(reading(95.)), Ok(reading(101.))]);
        let mut scheduler = scheduler(source, &clock);

        scheduler.start().unwrap();
        clock.set(180);
        scheduler.tick().unwrap();

        let mut expected = crate::display::Canvas::new();
        expected.write_string("101F", 0, 0, &crate::display::FONT_3X5, BRIGHT);
        let canvas = scheduler.renderer().canvas();
        assert!((0..5).all(|y| (0..WIDTH).all(|x| canvas.get_pixel(x, y)
            == expected.get_pixel(x, y))));
    }

    #[test]
    fn transient_failure_keeps_stale_data() {
        let clock = FakeClock::at(0);
        let source = ScriptedSource::new(vec![
            Ok(reading(72.)),
            Err(FetchError::SourceUnavailable("timeout".into())),
            Err(FetchError::SourceUnavailable("timeout".into())),
            Err(FetchError::SourceUnavailable("timeout".into())),
            Err(FetchError::MalformedPayload("missing temperature".into())),
        ]);
        let mut scheduler = scheduler(source, &clock);

        scheduler.start().unwrap();
        let before = scheduler.renderer().canvas().clone();

        clock.set(180);
        assert_eq!(Tick::Refresh, scheduler.tick().unwrap());
        clock.set(360);
        assert_eq!(Tick::Refresh, scheduler.tick().unwrap());

        let after = scheduler.renderer().canvas();
        assert!((0..5).all(|y| (0..WIDTH).all(|x| after.get_pixel(x, y)
            == before.get_pixel(x, y))));
        assert_eq!(1, scheduler.trend().sample_count());
    }

    #[test]
    fn auth_failure_is_fatal() {
        let clock = FakeClock::at(0);
        let source = ScriptedSource::new(vec![Err(FetchError::AuthFailure("401".into()))]);
        let calls = source.calls.clone();
        let mut scheduler = scheduler(source, &clock);

        assert!(matches!(
            scheduler.run(),
            Err(Error::Fetch(FetchError::AuthFailure(_)))
        ));
        assert_eq!(1, calls.get());
        assert_eq!(
            Some(crate::display::Canvas::new()),
            scheduler.renderer().display().last
        );
    }

    #[test]
    fn auth_failure_after_first_reading_keeps_stale_data() {
        let clock = FakeClock::at(0);
        let source = ScriptedSource::new(vec![
            Ok(reading(72.)),
            Err(FetchError::AuthFailure("HTTP 404 Not Found".into())),
        ]);
        let mut scheduler = scheduler(source, &clock);

        scheduler.start().unwrap();
        let before = scheduler.renderer().canvas().clone();

        clock.set(180);
        assert_eq!(Tick::Refresh, scheduler.tick().unwrap());

        let after = scheduler.renderer().canvas();
        assert!((0..5).all(|y| (0..WIDTH).all(|x| after.get_pixel(x, y)
            == before.get_pixel(x, y))));
        assert_eq!(Some(&reading(72.)), scheduler.observation());
        assert!(scheduler.renderer().display().powered);
    }

    #[test]
    fn run_survives_auth_failure_after_first_reading() {
        let clock = FakeClock::at(0);
        let running = Arc::new(AtomicBool::new(true));
        let mut source = ScriptedSource::new(vec![
            Ok(reading(72.)),
            Err(FetchError::AuthFailure("HTTP 404 Not Found".into())),
        ]);
        source.stop = Some(running.clone());
        let calls = source.calls.clone();

        let renderer =
            Renderer::new(MemoryDisplay::default(), clock.clone(), Timing::default()).unwrap();
        let mut scheduler = Scheduler::new(source, renderer, clock.clone(), settings(), running);

        scheduler.run().unwrap();

        // Start-up, the rejected poll at 180 and the final poll at 360 that ends the script.
        assert_eq!(3, calls.get());
        assert_eq!(360, clock.now().unix_timestamp());
        assert_eq!(Some(&reading(72.)), scheduler.observation());
    }

    /// Accepts `limit` frames, then fails every `show`.
    struct FailingDisplay {
        limit: usize,
        attempts: usize,
        powered: bool,
    }

    impl Display for FailingDisplay {
        type Err = std::io::Error;

        fn on(&mut self) -> std::result::Result<(), Self::Err> {
            self.powered = true;
            Ok(())
        }

        fn off(&mut self) -> std::result::Result<(), Self::Err> {
            self.powered = false;
            Ok(())
        }

        fn show(&mut self, _: &crate::display::Canvas) -> std::result::Result<(), Self::Err> {
            self.attempts += 1;
            if self.attempts > self.limit {
                Err(std::io::Error::new(
                    std::io::ErrorKind::Other,
                    format!("bus fault on frame {}", self.attempts),
                ))
            } else {
                Ok(())
            }
        }

        fn get_dimensions(&self) -> (usize, usize) {
            (WIDTH, crate::display::HEIGHT)
        }
    }

    #[test]
    fn display_failure_ends_the_loop() {
        let clock = FakeClock::at(0);
        let source = ScriptedSource::new(vec![Ok(reading(72.)), Ok(reading(73.))]);
        let calls = source.calls.clone();

        // Frame 1 is the blank start-up frame; frames 2 and 3 are the wind bar and trend.
        let display = FailingDisplay {
            limit: 3,
            attempts: 0,
            powered: false,
        };
        let renderer = Renderer::new(display, clock.clone(), Timing::default()).unwrap();
        let mut scheduler = Scheduler::new(
            source,
            renderer,
            clock.clone(),
            settings(),
            Arc::new(AtomicBool::new(true)),
        );

        let error = scheduler.run().unwrap_err();

        assert!(matches!(error, Error::Display(_)));
        assert!(error.to_string().contains("frame 4"), "{}", error);
        assert_eq!(1, calls.get());
        // The shutdown clear was attempted, failed, and left the driver powered.
        assert_eq!(5, scheduler.renderer().display().attempts);
        assert!(scheduler.renderer().display().powered);
        assert!(clock.sleeps().is_empty());
    }

    #[test]
    fn feels_like_selects_displayed_reading() {
        let clock = FakeClock::at(0);
        let renderer =
            Renderer::new(MemoryDisplay::default(), clock.clone(), Timing::default()).unwrap();
        let mut scheduler = Scheduler::new(
            ScriptedSource::new(vec![Ok(Observation {
                temperature: 35.,
                feels_like: 28.,
                wind_speed: 0.,
                wind_gust: 0.,
            })]),
            renderer,
            clock.clone(),
            Settings {
                temperature_display: TemperatureDisplay::FeelsLike,
                ..settings()
            },
            Arc::new(AtomicBool::new(true)),
        );
        scheduler.start().unwrap();

        let mut expected = crate::display::Canvas::new();
        expected.write_string("28F", 0, 0, &crate::display::FONT_3X5, BRIGHT);
        assert_eq!(&expected, scheduler.renderer().canvas());
        assert_eq!(Some(35.), scheduler.trend().average());
    }
}
