use std::io::{self, IsTerminal, Write};

use unicode_width::UnicodeWidthStr;

use crate::calendar::{CalendarMode, DayCell};
use crate::config::Config;
use crate::datetime::format_iso_date;
use crate::pages::{CreateTaskView, DayListView, HomeView};
use crate::task::{Priority, Task};

const CLEAR_SCREEN: &str = "\x1b[2J\x1b[H";

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        Ok(Self {
            color: cfg.color()? && io::stdout().is_terminal(),
        })
    }

    pub fn plain() -> Self {
        Self { color: false }
    }

    pub fn clear<W: Write + ?Sized>(&self, out: &mut W) -> anyhow::Result<()> {
        if self.color {
            write!(out, "{CLEAR_SCREEN}")?;
        }
        Ok(())
    }

    #[tracing::instrument(skip_all)]
    pub fn write_home<W: Write + ?Sized>(
        &self,
        out: &mut W,
        view: &HomeView,
    ) -> anyhow::Result<()> {
        if let (Some(time), Some(date)) = (&view.clock_time, &view.clock_date) {
            writeln!(out, "{}  {}", self.paint(time, "1"), date)?;
        }
        writeln!(out, "{} {}", self.paint(view.month, "1"), view.year)?;
        match view.mode {
            CalendarMode::Week => self.write_week(out, &view.cells)?,
            CalendarMode::Month => self.write_month(out, &view.cells)?,
        }
        writeln!(out)?;
        writeln!(
            out,
            "Completed {}   Pending {}   ({})",
            self.paint(&view.completed_count.to_string(), "32"),
            self.paint(&view.pending_count.to_string(), "33"),
            format_iso_date(view.selected_date)
        )?;
        writeln!(out)?;
        self.write_task_table(out, &view.tasks)
    }

    #[tracing::instrument(skip_all)]
    pub fn write_day_list<W: Write + ?Sized>(
        &self,
        out: &mut W,
        view: &DayListView,
    ) -> anyhow::Result<()> {
        writeln!(
            out,
            "{}  {}",
            self.paint(view.kind.title(), "1"),
            view.date_label
        )?;
        self.write_week(out, &view.week)?;
        writeln!(out)?;
        match view.empty_message {
            Some(message) => writeln!(out, "{message}")?,
            None => self.write_task_table(out, &view.tasks)?,
        }
        Ok(())
    }

    pub fn write_create<W: Write + ?Sized>(
        &self,
        out: &mut W,
        view: &CreateTaskView,
    ) -> anyhow::Result<()> {
        writeln!(out, "{}  {}", self.paint("Create Task", "1"), view.date_label)?;
        self.write_week(out, &view.week)?;
        writeln!(out)?;
        writeln!(
            out,
            "New tasks go to {}.",
            format_iso_date(view.selected_date)
        )?;
        Ok(())
    }

    pub fn write_week<W: Write + ?Sized>(
        &self,
        out: &mut W,
        cells: &[DayCell],
    ) -> anyhow::Result<()> {
        let names: Vec<String> = cells.iter().map(|c| format!("{:^5}", c.day_name)).collect();
        writeln!(out, "{}", names.join(" "))?;
        let days: Vec<String> = cells.iter().map(|c| self.day_token(c)).collect();
        writeln!(out, "{}", days.join(" "))?;
        Ok(())
    }

    pub fn write_month<W: Write + ?Sized>(
        &self,
        out: &mut W,
        cells: &[DayCell],
    ) -> anyhow::Result<()> {
        let names: Vec<String> = cells
            .iter()
            .take(7)
            .map(|c| format!("{:^5}", c.day_name))
            .collect();
        writeln!(out, "{}", names.join(" "))?;
        for row in cells.chunks(7) {
            let days: Vec<String> = row.iter().map(|c| self.day_token(c)).collect();
            writeln!(out, "{}", days.join(" "))?;
        }
        Ok(())
    }

    /// Five columns wide: `[15]` selected, `(30)` outside the month, `12*`
    /// today.
    fn day_token(&self, cell: &DayCell) -> String {
        let number = cell.day_number.to_string();
        let token = if cell.is_active {
            format!("[{number:>2}]")
        } else if cell.other_month {
            format!("({number:>2})")
        } else if cell.is_today {
            format!(" {number:>2}*")
        } else {
            format!(" {number:>2} ")
        };
        let token = format!("{token:<5}");

        if cell.is_active {
            self.paint(&token, "7")
        } else if cell.other_month {
            self.paint(&token, "2")
        } else if cell.is_today {
            self.paint(&token, "36")
        } else {
            token
        }
    }

    pub fn write_task_table<W: Write + ?Sized>(
        &self,
        out: &mut W,
        tasks: &[Task],
    ) -> anyhow::Result<()> {
        let headers = vec![
            "#".to_string(),
            "ID".to_string(),
            "Done".to_string(),
            "Priority".to_string(),
            "Name".to_string(),
            "Description".to_string(),
        ];

        let rows = tasks
            .iter()
            .enumerate()
            .map(|(idx, task)| {
                vec![
                    (idx + 1).to_string(),
                    task.id.to_string(),
                    if task.completed { "x" } else { " " }.to_string(),
                    self.paint(task.priority.label(), priority_color(task.priority)),
                    task.name.clone(),
                    task.description.clone(),
                ]
            })
            .collect();

        write_table(out, headers, rows)
    }

    pub fn write_notice<W: Write + ?Sized>(&self, out: &mut W, text: &str) -> anyhow::Result<()> {
        writeln!(out, "{}", self.paint(&format!("✓ {text}"), "32"))?;
        Ok(())
    }

    fn paint(&self, text: &str, code: &str) -> String {
        if !self.color {
            return text.to_string();
        }
        format!("\x1b[{code}m{text}\x1b[0m")
    }
}

fn priority_color(priority: Priority) -> &'static str {
    match priority {
        Priority::Low => "32",
        Priority::Medium => "33",
        Priority::High => "31",
    }
}

fn write_table<W: Write>(
    mut writer: W,
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
) -> anyhow::Result<()> {
    let column_count = headers.len();
    let mut widths = vec![0usize; column_count];

    for (idx, header) in headers.iter().enumerate() {
        widths[idx] = widths[idx].max(UnicodeWidthStr::width(header.as_str()));
    }

    for row in &rows {
        for (idx, cell) in row.iter().enumerate() {
            widths[idx] = widths[idx].max(UnicodeWidthStr::width(strip_ansi(cell).as_str()));
        }
    }

    for idx in 0..column_count {
        write!(writer, "{:width$} ", headers[idx], width = widths[idx])?;
    }
    writeln!(writer)?;

    for idx in 0..column_count {
        write!(writer, "{:-<width$} ", "", width = widths[idx])?;
    }
    writeln!(writer)?;

    for row in rows {
        for idx in 0..column_count {
            let cell = &row[idx];
            let visible_width = UnicodeWidthStr::width(strip_ansi(cell).as_str());
            let padding = widths[idx].saturating_sub(visible_width);
            write!(writer, "{}{} ", cell, " ".repeat(padding))?;
        }
        writeln!(writer)?;
    }

    Ok(())
}

fn strip_ansi(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut escaped = false;

    for ch in s.chars() {
        if escaped {
            if ch == 'm' {
                escaped = false;
            }
            continue;
        }

        if ch == '\x1b' {
            escaped = true;
            continue;
        }

        out.push(ch);
    }

    out
}

#[cfg(test)]
mod tests {
    use chrono::NaiveDate;

    use super::*;
    use crate::calendar::render_week;

    fn ymd(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).expect("date")
    }

    #[test]
    fn bad_color_setting_is_rejected() {
        let mut cfg = Config::defaults();
        cfg.apply_overrides([("color".to_string(), "maybe".to_string())]);
        assert!(Renderer::new(&cfg).is_err());

        cfg.apply_overrides([("color".to_string(), "off".to_string())]);
        let renderer = Renderer::new(&cfg).expect("renderer");
        let mut out = Vec::new();
        renderer.clear(&mut out).expect("clear");
        assert!(out.is_empty());
    }

    #[test]
    fn week_strip_marks_selection() {
        let cells = render_week(ymd(2024, 3, 15), ymd(2024, 3, 15), ymd(2024, 3, 11));
        let mut out = Vec::new();
        Renderer::plain().write_week(&mut out, &cells).expect("render");
        let text = String::from_utf8(out).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();
        assert!(lines[0].starts_with(" SUN "));
        assert!(lines[1].contains("[15]"));
        assert!(lines[1].contains(" 11*"));
    }

    #[test]
    fn table_columns_align_with_wide_names() {
        let task = Task::new_pending(
            1,
            "買い物".to_string(),
            Priority::High,
            ymd(2024, 3, 15),
            chrono::Utc::now(),
        );
        let mut out = Vec::new();
        Renderer::plain()
            .write_task_table(&mut out, &[task])
            .expect("render");
        let text = String::from_utf8(out).expect("utf8");
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[2].contains("HIGH"));
        assert_eq!(
            UnicodeWidthStr::width(lines[0].trim_end()),
            UnicodeWidthStr::width(lines[1].trim_end())
        );
    }

    #[test]
    fn strip_ansi_removes_sequences() {
        assert_eq!(strip_ansi("\x1b[31mred\x1b[0m"), "red");
    }
}
