use chrono::{Datelike, NaiveDate};

use crate::datetime::{add_days, first_day_of_month, shift_months, start_of_week};

const DAY_NAMES: [&str; 7] = ["SUN", "MON", "TUE", "WED", "THU", "FRI", "SAT"];

const MONTH_NAMES: [&str; 12] = [
    "January",
    "February",
    "March",
    "April",
    "May",
    "June",
    "July",
    "August",
    "September",
    "October",
    "November",
    "December",
];

pub const WEEK_CELLS: usize = 7;
pub const MONTH_CELLS: usize = 42;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DayCell {
    pub date: NaiveDate,
    pub day_name: &'static str,
    pub day_number: u32,
    pub is_active: bool,
    pub is_today: bool,
    pub other_month: bool,
}

impl DayCell {
    fn new(date: NaiveDate, selected: NaiveDate, today: NaiveDate) -> Self {
        Self {
            date,
            day_name: day_name(date),
            day_number: date.day(),
            is_active: date == selected,
            is_today: date == today,
            other_month: false,
        }
    }
}

pub fn day_name(date: NaiveDate) -> &'static str {
    DAY_NAMES[date.weekday().num_days_from_sunday() as usize]
}

pub fn month_label(date: NaiveDate) -> &'static str {
    MONTH_NAMES[date.month0() as usize]
}

/// `15 Mar`
pub fn short_date_label(date: NaiveDate) -> String {
    format!("{} {}", date.day(), &month_label(date)[..3])
}

/// Seven cells, Sunday first, for the week containing `anchor`.
pub fn render_week(anchor: NaiveDate, selected: NaiveDate, today: NaiveDate) -> Vec<DayCell> {
    let start = start_of_week(anchor);
    (0..WEEK_CELLS as i64)
        .map(|offset| DayCell::new(add_days(start, offset), selected, today))
        .collect()
}

/// Six full weeks starting on the Sunday on or before the 1st of
/// `current`'s month.
pub fn render_month(current: NaiveDate, selected: NaiveDate, today: NaiveDate) -> Vec<DayCell> {
    let first = first_day_of_month(current.year(), current.month());
    let start = start_of_week(first);
    (0..MONTH_CELLS as i64)
        .map(|offset| {
            let date = add_days(start, offset);
            let mut cell = DayCell::new(date, selected, today);
            cell.other_month =
                date.month() != current.month() || date.year() != current.year();
            cell
        })
        .collect()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CalendarMode {
    #[default]
    Week,
    Month,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    Day,
    Month,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CalendarView {
    pub current_date: NaiveDate,
    pub selected_date: NaiveDate,
    pub mode: CalendarMode,
}

impl CalendarView {
    pub fn new(initial: NaiveDate) -> Self {
        Self {
            current_date: initial,
            selected_date: initial,
            mode: CalendarMode::Week,
        }
    }

    pub fn pick_week_day(&mut self, date: NaiveDate) {
        self.current_date = date;
        self.selected_date = date;
    }

    /// Selecting a cell from a neighbouring month also moves the grid there.
    pub fn pick_month_day(&mut self, date: NaiveDate) {
        self.selected_date = date;
        if date.month() != self.current_date.month() || date.year() != self.current_date.year() {
            self.current_date = date;
        }
    }

    pub fn pick(&mut self, date: NaiveDate) {
        match self.mode {
            CalendarMode::Week => self.pick_week_day(date),
            CalendarMode::Month => self.pick_month_day(date),
        }
    }

    /// Moves `current_date` only; callers decide whether the selection
    /// follows.
    pub fn step(&mut self, step: Step, amount: i64) {
        self.current_date = match step {
            Step::Day => add_days(self.current_date, amount),
            Step::Month => shift_months(
                self.current_date,
                i32::try_from(amount).unwrap_or(if amount < 0 { i32::MIN } else { i32::MAX }),
            ),
        };
    }

    pub fn toggle_mode(&mut self) {
        self.mode = match self.mode {
            CalendarMode::Week => CalendarMode::Month,
            CalendarMode::Month => CalendarMode::Week,
        };
    }
}

#[cfg(test)]
mod tests {
    use chrono::Weekday;

    use super::*;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("date")
    }

    #[test]
    fn week_is_seven_cells_from_sunday_for_any_weekday() {
        let today = ymd(2024, 3, 1);
        for offset in 0..14 {
            let anchor = add_days(ymd(2024, 3, 10), offset);
            let cells = render_week(anchor, anchor, today);
            assert_eq!(cells.len(), 7);
            assert_eq!(cells[0].date.weekday(), Weekday::Sun);
            assert_eq!(cells[0].day_name, "SUN");
            assert_eq!(cells[6].day_name, "SAT");
            assert!(cells.iter().any(|c| c.date == anchor));
            assert_eq!(cells.iter().filter(|c| c.is_active).count(), 1);
        }
    }

    #[test]
    fn week_marks_today_and_selection_independently() {
        let cells = render_week(ymd(2024, 3, 13), ymd(2024, 3, 14), ymd(2024, 3, 11));
        let active: Vec<u32> = cells.iter().filter(|c| c.is_active).map(|c| c.day_number).collect();
        let today: Vec<u32> = cells.iter().filter(|c| c.is_today).map(|c| c.day_number).collect();
        assert_eq!(active, vec![14]);
        assert_eq!(today, vec![11]);
    }

    #[test]
    fn month_grid_is_always_42_cells() {
        for month in 1..=12 {
            let current = ymd(2024, month, 15);
            let cells = render_month(current, current, current);
            assert_eq!(cells.len(), 42);
            assert_eq!(cells[0].date.weekday(), Weekday::Sun);

            for cell in &cells {
                let inside = cell.date.month() == month && cell.date.year() == 2024;
                assert_eq!(cell.other_month, !inside, "{}", cell.date);
            }
        }
    }

    #[test]
    fn month_grid_starting_on_sunday_has_no_leading_filler() {
        // September 2024 begins on a Sunday.
        let cells = render_month(ymd(2024, 9, 20), ymd(2024, 9, 20), ymd(2024, 9, 20));
        assert_eq!(cells[0].date, ymd(2024, 9, 1));
        assert!(!cells[0].other_month);
        assert!(cells[41].other_month);
    }

    #[test]
    fn picking_neighbouring_month_cell_moves_grid() {
        let mut view = CalendarView::new(ymd(2024, 3, 15));
        view.mode = CalendarMode::Month;

        view.pick(ymd(2024, 3, 20));
        assert_eq!(view.current_date, ymd(2024, 3, 15));
        assert_eq!(view.selected_date, ymd(2024, 3, 20));

        view.pick(ymd(2024, 4, 2));
        assert_eq!(view.current_date, ymd(2024, 4, 2));
    }

    #[test]
    fn labels() {
        assert_eq!(short_date_label(ymd(2024, 3, 5)), "5 Mar");
        assert_eq!(month_label(ymd(2024, 12, 1)), "December");
    }
}
