use chrono::{Datelike, Duration, NaiveDateTime, Timelike, Weekday};
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum ScheduleError {
    #[error("invalid time of day '{0}', expected HH:MM")]
    Time(String),

    #[error("unknown weekday '{0}'")]
    Day(String),
}

#[derive(Deserialize, Serialize, Debug, Eq, PartialEq, Copy, Clone)]
pub enum ScreenState {
    Unknown,
    On,
    Cooling,
    Off,
}

impl ScreenState {
    /// The display is lit in both `On` and `Cooling`.
    #[must_use]
    pub const fn lit(self) -> bool {
        matches!(self, Self::On | Self::Cooling)
    }
}

#[derive(Deserialize, Serialize, Debug, Eq, PartialEq, Copy, Clone)]
pub enum ScreenCmd {
    On,
    Off,
}

impl From<bool> for ScreenCmd {
    fn from(val: bool) -> Self {
        if val {
            Self::On
        } else {
            Self::Off
        }
    }
}

fn minutes(time: &str) -> Result<u32, ScheduleError> {
    let (h, m) = time
        .split_once(':')
        .ok_or_else(|| ScheduleError::Time(time.into()))?;
    let h: u32 = h.parse().map_err(|_| ScheduleError::Time(time.into()))?;
    let m: u32 = m.parse().map_err(|_| ScheduleError::Time(time.into()))?;
    if h > 23 || m > 59 {
        return Err(ScheduleError::Time(time.into()));
    }
    Ok(h * 60 + m)
}

fn hhmm(total: u32) -> String {
    format!("{:02}:{:02}", total / 60, total % 60)
}

/// Daily time range during which the screen must stay off even after
/// the cooldown has elapsed. `start > end` wraps past midnight.
#[derive(Debug, PartialEq, Eq, Clone)]
pub struct Schedule {
    start: u32,
    end: u32,
    active_days: Vec<Weekday>,
    weekday_gate: bool,
}

impl Schedule {
    pub fn new(
        start: &str,
        end: &str,
        days: &[String],
        weekday_gate: bool,
    ) -> Result<Self, ScheduleError> {
        let active_days = days
            .iter()
            .map(|d| d.parse().map_err(|_| ScheduleError::Day(d.clone())))
            .collect::<Result<Vec<Weekday>, _>>()?;
        Ok(Self {
            start: minutes(start)?,
            end: minutes(end)?,
            active_days,
            weekday_gate,
        })
    }

    #[must_use]
    pub fn bounds(&self) -> (String, String) {
        (hhmm(self.start), hhmm(self.end))
    }

    /// Both bounds are inclusive. With `weekday_gate` off the window
    /// applies every day, whatever `active_days` says.
    #[must_use]
    pub fn quiet(&self, now: NaiveDateTime) -> bool {
        if self.weekday_gate && !self.active_days.contains(&now.weekday()) {
            return false;
        }
        let t = now.hour() * 60 + now.minute();
        if self.start <= self.end {
            self.start <= t && t <= self.end
        } else {
            t >= self.start || t <= self.end
        }
    }
}

#[derive(Debug, Eq, PartialEq, Clone)]
pub enum Presentation {
    Quiet { start: String, end: String },
    Motion,
    Countdown(i64),
    Idle,
}

#[derive(Debug, Eq, PartialEq, Copy, Clone, Default)]
pub enum Lang {
    #[default]
    En,
    De,
}

impl Lang {
    #[must_use]
    pub fn from_tag(tag: &str) -> Self {
        if tag.to_ascii_lowercase().starts_with("de") {
            Self::De
        } else {
            Self::En
        }
    }
}

#[must_use]
pub fn format_countdown(seconds: i64) -> String {
    let left = seconds.max(0);
    format!("{:02}:{:02}", left / 60, left % 60)
}

impl Presentation {
    #[must_use]
    pub fn render(&self, lang: Lang) -> String {
        match (self, lang) {
            (Self::Quiet { start, end }, Lang::En) => format!("Quiet hours: {start} to {end}"),
            (Self::Quiet { start, end }, Lang::De) => format!("Ruhezeit: {start} bis {end}"),
            (Self::Motion, Lang::En) => "Motion detected".to_string(),
            (Self::Motion, Lang::De) => "Bewegung erkannt".to_string(),
            (Self::Countdown(left), Lang::En) => {
                format!("Screen off in: {}", format_countdown(*left))
            }
            (Self::Countdown(left), Lang::De) => {
                format!("Bildschirm aus in: {}", format_countdown(*left))
            }
            (Self::Idle, Lang::En) => "Screen is active".to_string(),
            (Self::Idle, Lang::De) => "Bildschirm ist aktiv".to_string(),
        }
    }
}

/// Snapshot published to the host dashboard.
#[derive(Serialize, Debug, PartialEq, Eq, Clone)]
pub struct StateReport {
    pub state: ScreenState,
    pub label: String,
    pub off_in: Option<i64>,
}

/// Decides whether the screen should be powered from a stream of
/// motion observations. Owns all mutable state; `now` is always passed
/// in so decisions are reproducible.
#[derive(Debug, Clone)]
pub struct Engine {
    cool_down: Duration,
    schedule: Schedule,
    state: ScreenState,
    last_motion_at: NaiveDateTime,
    scheduled_off_at: Option<NaiveDateTime>,
}

impl Engine {
    #[must_use]
    pub fn new(cool_down_secs: u32, schedule: Schedule, started_at: NaiveDateTime) -> Self {
        Self {
            cool_down: Duration::seconds(cool_down_secs.into()),
            schedule,
            state: ScreenState::Unknown,
            last_motion_at: started_at,
            scheduled_off_at: None,
        }
    }

    #[must_use]
    pub const fn state(&self) -> ScreenState {
        self.state
    }

    #[must_use]
    pub const fn scheduled_off_at(&self) -> Option<NaiveDateTime> {
        self.scheduled_off_at
    }

    /// Feeds one poll result into the state machine. Returns the power
    /// command to apply, if any; commands fire only on transitions, so
    /// repeated identical observations stay silent.
    pub fn observe(&mut self, motion: bool, now: NaiveDateTime) -> Option<ScreenCmd> {
        if motion {
            self.last_motion_at = now;
            self.scheduled_off_at = Some(now + self.cool_down);
            let was_lit = self.state.lit();
            self.state = ScreenState::On;
            return if was_lit { None } else { Some(ScreenCmd::On) };
        }
        let elapsed = now.signed_duration_since(self.last_motion_at);
        if elapsed > self.cool_down {
            if self.schedule.quiet(now) || self.state == ScreenState::Off {
                // off is suppressed for the whole quiet window
                None
            } else {
                self.state = ScreenState::Off;
                self.scheduled_off_at = None;
                Some(ScreenCmd::Off)
            }
        } else {
            self.state = ScreenState::Cooling;
            self.scheduled_off_at
                .get_or_insert(self.last_motion_at + self.cool_down);
            None
        }
    }

    /// Pure projection of the current state into a display label. The
    /// quiet window takes visual precedence over the motion state.
    #[must_use]
    pub fn project(&self, now: NaiveDateTime) -> Presentation {
        if self.schedule.quiet(now) {
            let (start, end) = self.schedule.bounds();
            return Presentation::Quiet { start, end };
        }
        match (self.state, self.scheduled_off_at) {
            (ScreenState::On, _) => Presentation::Motion,
            (ScreenState::Cooling, Some(off)) => {
                Presentation::Countdown(off.signed_duration_since(now).num_seconds().max(0))
            }
            _ => Presentation::Idle,
        }
    }

    /// `off_in` is populated only while cooling, where the countdown
    /// is actually displayed; during continuous motion the report
    /// stays unchanged so watchers are not woken every refresh.
    #[must_use]
    pub fn report(&self, now: NaiveDateTime, lang: Lang) -> StateReport {
        let off_in = match self.state {
            ScreenState::Cooling => self
                .scheduled_off_at
                .map(|off| off.signed_duration_since(now).num_seconds().max(0)),
            _ => None,
        };
        StateReport {
            state: self.state,
            label: self.project(now).render(lang),
            off_in,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn dt(day: u32, h: u32, m: u32, s: u32) -> NaiveDateTime {
        // January 2024: the 6th is a Saturday, the 3rd a Wednesday.
        NaiveDate::from_ymd_opt(2024, 1, day)
            .unwrap()
            .and_hms_opt(h, m, s)
            .unwrap()
    }

    fn any_day(start: &str, end: &str) -> Schedule {
        Schedule::new(start, end, &[], false).unwrap()
    }

    fn days(list: &[&str]) -> Vec<String> {
        list.iter().map(|d| (*d).to_string()).collect()
    }

    #[test]
    fn window_non_wrapping_inclusive_bounds() {
        let schedule = any_day("06:00", "08:30");
        assert!(schedule.quiet(dt(3, 6, 0, 0)));
        assert!(schedule.quiet(dt(3, 7, 15, 0)));
        assert!(schedule.quiet(dt(3, 8, 30, 0)));
        assert!(!schedule.quiet(dt(3, 5, 59, 0)));
        assert!(!schedule.quiet(dt(3, 8, 31, 0)));
    }

    #[test]
    fn window_wrapping_midnight() {
        let schedule = any_day("22:00", "06:00");
        assert!(schedule.quiet(dt(3, 22, 0, 0)));
        assert!(schedule.quiet(dt(3, 23, 30, 0)));
        assert!(schedule.quiet(dt(3, 3, 0, 0)));
        assert!(schedule.quiet(dt(3, 6, 0, 0)));
        assert!(!schedule.quiet(dt(3, 12, 0, 0)));
        assert!(!schedule.quiet(dt(3, 21, 59, 0)));
    }

    #[test]
    fn weekday_gate() {
        let gated = Schedule::new("06:00", "08:00", &days(&["Sat", "Sun"]), true).unwrap();
        assert!(gated.quiet(dt(6, 7, 0, 0))); // Saturday
        assert!(!gated.quiet(dt(3, 7, 0, 0))); // Wednesday

        // gate off: the day list is ignored
        let legacy = Schedule::new("06:00", "08:00", &days(&["Sat"]), false).unwrap();
        assert!(legacy.quiet(dt(3, 7, 0, 0)));

        // gate on with no listed day: window never applies
        let empty = Schedule::new("06:00", "08:00", &[], true).unwrap();
        assert!(!empty.quiet(dt(6, 7, 0, 0)));
    }

    #[test]
    fn schedule_parse_errors() {
        assert_eq!(
            Schedule::new("25:00", "06:00", &[], false),
            Err(ScheduleError::Time("25:00".to_string()))
        );
        assert_eq!(
            Schedule::new("06:00", "06:61", &[], false),
            Err(ScheduleError::Time("06:61".to_string()))
        );
        assert_eq!(
            Schedule::new("0600", "07:00", &[], false),
            Err(ScheduleError::Time("0600".to_string()))
        );
        assert_eq!(
            Schedule::new("06:00", "07:00", &days(&["Caturday"]), true),
            Err(ScheduleError::Day("Caturday".to_string()))
        );
    }

    #[test]
    fn motion_toggles_on_once() {
        let mut engine = Engine::new(300, any_day("22:00", "06:00"), dt(3, 12, 0, 0));
        assert_eq!(engine.observe(true, dt(3, 12, 0, 2)), Some(ScreenCmd::On));
        assert_eq!(engine.state(), ScreenState::On);
        assert_eq!(engine.observe(true, dt(3, 12, 0, 4)), None);
        assert_eq!(engine.state(), ScreenState::On);
    }

    #[test]
    fn cooling_to_on_does_not_reemit() {
        let mut engine = Engine::new(300, any_day("22:00", "06:00"), dt(3, 12, 0, 0));
        assert_eq!(engine.observe(true, dt(3, 12, 0, 0)), Some(ScreenCmd::On));
        assert_eq!(engine.observe(false, dt(3, 12, 0, 2)), None);
        assert_eq!(engine.state(), ScreenState::Cooling);
        // the display never went dark, so no second power-on
        assert_eq!(engine.observe(true, dt(3, 12, 0, 4)), None);
        assert_eq!(engine.state(), ScreenState::On);
    }

    #[test]
    fn cooldown_boundary() {
        let mut engine = Engine::new(300, any_day("22:00", "06:00"), dt(3, 12, 0, 0));
        engine.observe(true, dt(3, 12, 0, 0));

        // exactly at the cooldown limit: still cooling
        assert_eq!(engine.observe(false, dt(3, 12, 5, 0)), None);
        assert_eq!(engine.state(), ScreenState::Cooling);
        assert!(engine.scheduled_off_at().is_some());

        // first tick past the limit: exactly one power-off
        assert_eq!(engine.observe(false, dt(3, 12, 5, 1)), Some(ScreenCmd::Off));
        assert_eq!(engine.state(), ScreenState::Off);
        assert_eq!(engine.scheduled_off_at(), None);

        // later ticks stay silent
        assert_eq!(engine.observe(false, dt(3, 12, 5, 3)), None);
        assert_eq!(engine.state(), ScreenState::Off);
    }

    #[test]
    fn quiet_window_suppresses_off() {
        // wrapping window on Saturdays only, cooldown 60 s
        let schedule = Schedule::new("22:00", "06:00", &days(&["Sat"]), true).unwrap();
        let mut engine = Engine::new(60, schedule, dt(6, 22, 0, 0));
        engine.observe(true, dt(6, 22, 58, 0));

        // Saturday 23:00, elapsed 120 s > cooldown, but inside the window
        assert_eq!(engine.observe(false, dt(6, 23, 0, 0)), None);
        assert_eq!(engine.state(), ScreenState::On);
        assert!(engine.scheduled_off_at().is_some());
    }

    #[test]
    fn cooling_before_first_motion() {
        let mut engine = Engine::new(300, any_day("22:00", "06:00"), dt(3, 12, 0, 0));
        assert_eq!(engine.observe(false, dt(3, 12, 0, 10)), None);
        assert_eq!(engine.state(), ScreenState::Cooling);
        assert_eq!(engine.scheduled_off_at(), Some(dt(3, 12, 5, 0)));
    }

    #[test]
    fn countdown_label() {
        assert_eq!(format_countdown(75), "01:15");
        assert_eq!(format_countdown(0), "00:00");
        assert_eq!(format_countdown(-3), "00:00");
        assert_eq!(format_countdown(605), "10:05");

        let mut engine = Engine::new(100, any_day("22:00", "06:00"), dt(3, 12, 0, 0));
        engine.observe(true, dt(3, 12, 0, 0));
        engine.observe(false, dt(3, 12, 0, 10));
        assert_eq!(engine.project(dt(3, 12, 0, 25)), Presentation::Countdown(75));
        assert_eq!(
            engine.project(dt(3, 12, 0, 25)).render(Lang::En),
            "Screen off in: 01:15"
        );
    }

    #[test]
    fn quiet_window_takes_visual_precedence() {
        let schedule = Schedule::new("22:00", "06:00", &days(&["Sat"]), true).unwrap();
        let mut engine = Engine::new(300, schedule, dt(6, 22, 0, 0));
        engine.observe(true, dt(6, 23, 0, 0));
        assert_eq!(engine.state(), ScreenState::On);
        assert_eq!(
            engine.project(dt(6, 23, 1, 0)),
            Presentation::Quiet {
                start: "22:00".to_string(),
                end: "06:00".to_string()
            }
        );
    }

    #[test]
    fn render_languages() {
        assert_eq!(Lang::from_tag("de-DE"), Lang::De);
        assert_eq!(Lang::from_tag("en"), Lang::En);
        assert_eq!(Lang::from_tag("fr"), Lang::En);
        assert_eq!(Presentation::Motion.render(Lang::De), "Bewegung erkannt");
        assert_eq!(Presentation::Idle.render(Lang::En), "Screen is active");
        assert_eq!(
            Presentation::Quiet {
                start: "22:00".to_string(),
                end: "06:00".to_string()
            }
            .render(Lang::De),
            "Ruhezeit: 22:00 bis 06:00"
        );
    }

    #[test]
    fn report_stable_during_continuous_motion() {
        let mut engine = Engine::new(100, any_day("22:00", "06:00"), dt(3, 12, 0, 0));
        engine.observe(true, dt(3, 12, 0, 0));
        let first = engine.report(dt(3, 12, 0, 1), Lang::En);
        let second = engine.report(dt(3, 12, 0, 2), Lang::En);
        assert_eq!(first, second);
        assert_eq!(first.off_in, None);
        assert_eq!(first.label, "Motion detected");
    }

    #[test]
    fn report_snapshot() {
        let mut engine = Engine::new(100, any_day("22:00", "06:00"), dt(3, 12, 0, 0));
        engine.observe(true, dt(3, 12, 0, 0));
        engine.observe(false, dt(3, 12, 0, 10));
        let report = engine.report(dt(3, 12, 0, 25), Lang::En);
        assert_eq!(report.state, ScreenState::Cooling);
        assert_eq!(report.off_in, Some(75));
        assert_eq!(report.label, "Screen off in: 01:15");
    }
}
