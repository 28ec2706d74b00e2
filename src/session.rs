use std::collections::BTreeSet;

use chrono::{Datelike, Duration, NaiveDate};

use crate::auth::AdminGate;
use crate::types::{Period, Team};

/// Per-user dashboard state, passed explicitly to every operation that needs
/// the current selection or admin rights.
#[derive(Debug, Clone)]
pub struct Session {
    team: Team,
    period: Period,
    date: NaiveDate,
    unlocked: BTreeSet<Team>,
}

impl Session {
    pub fn new(team: Team, today: NaiveDate) -> Self {
        Self {
            team,
            period: Period::of(today),
            date: today,
            unlocked: BTreeSet::new(),
        }
    }

    pub fn team(&self) -> Team {
        self.team
    }

    pub fn period(&self) -> Period {
        self.period
    }

    pub fn date(&self) -> NaiveDate {
        self.date
    }

    /// Cycles through [`Team::all`].
    pub fn cycle_team(&mut self, forward: bool) {
        let teams = Team::all();
        let index = teams.iter().position(|t| *t == self.team).unwrap_or(0);
        let next = if forward {
            (index + 1) % teams.len()
        } else {
            (index + teams.len() - 1) % teams.len()
        };
        self.team = teams[next];
    }

    /// Switching month moves the date to today when `period` is the current
    /// month, otherwise to the 1st.
    pub fn select_period(&mut self, period: Period, today: NaiveDate) {
        self.period = period;
        self.date = Self::default_date(period, today);
    }

    /// Picking a date also picks its month.
    pub fn select_date(&mut self, date: NaiveDate) {
        self.date = date;
        self.period = Period::of(date);
    }

    pub fn shift_date(&mut self, days: i64) {
        if let Some(date) = self.date.checked_add_signed(Duration::days(days)) {
            self.select_date(date);
        }
    }

    pub fn shift_month(&mut self, months: i32, today: NaiveDate) {
        let index = self.period.year * 12 + self.period.month as i32 - 1 + months;
        if let Some(period) = Period::new(index.div_euclid(12), index.rem_euclid(12) as u32 + 1) {
            self.select_period(period, today);
        }
    }

    /// Returns to today in the current month.
    pub fn select_today(&mut self, today: NaiveDate) {
        self.select_date(today);
    }

    pub fn is_unlocked(&self, team: Team) -> bool {
        self.unlocked.contains(&team)
    }

    pub fn is_admin(&self) -> bool {
        self.is_unlocked(self.team)
    }

    /// Unlocks admin controls of the selected team for the rest of the session.
    pub fn unlock(&mut self, gate: &AdminGate, secret: &str) -> bool {
        let ok = gate.verify(self.team, secret);
        if ok {
            self.unlocked.insert(self.team);
            tracing::info!(team = %self.team, "admin controls unlocked");
        } else {
            tracing::warn!(team = %self.team, "admin unlock rejected");
        }
        ok
    }

    pub fn lock(&mut self) {
        self.unlocked.remove(&self.team);
    }

    fn default_date(period: Period, today: NaiveDate) -> NaiveDate {
        if today.year() == period.year && today.month() == period.month {
            today
        } else {
            period.first_day()
        }
    }
}
