//! `dayplan watch`: one page kept open, driven by a clock tick, by writes
//! from other processes and by line commands on stdin.

use std::io::{self, BufRead, Write};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError};
use std::time::Instant;

use anyhow::anyhow;
use chrono::{NaiveDate, Utc};
use tracing::{debug, info, instrument, warn};

use crate::commands::CommandEnv;
use crate::datetime::parse_date_expr;
use crate::pages::{
    Confirm, CreateTaskPage, DayListPage, HomePage, Route, SubmitError, TaskForm,
};
use crate::storage::{FileWatcher, SELECTED_DATE_KEY, TASKS_KEY};
use crate::task::Priority;

const HELP: &str = "commands: prev | next | pick <date> | mode | toggle <n> | delete <n> | \
                    clear | add <priority> <name...> | \
                    open <home|create|pending|completed> | quit";

enum ActivePage {
    Home(HomePage),
    Create(CreateTaskPage),
    List(DayListPage),
}

impl ActivePage {
    fn open(env: &CommandEnv<'_>, route: &Route, today: NaiveDate) -> anyhow::Result<Self> {
        info!(url = %route.to_url(), "opening page");
        let page = match route {
            Route::Home => ActivePage::Home(HomePage::load(&env.storage, today)),
            Route::CreateTask => ActivePage::Create(CreateTaskPage::load(
                &env.storage,
                today,
                env.cfg.redirect_delay()?,
            )),
            Route::Pending { .. } | Route::Completed { .. } => ActivePage::List(
                DayListPage::load_route(route, &env.storage, today)
                    .ok_or_else(|| anyhow!("not a list page: {}", route.to_url()))?,
            ),
        };
        Ok(page)
    }

    fn pump(&mut self) -> bool {
        match self {
            ActivePage::Home(page) => page.pump(),
            ActivePage::List(page) => page.pump(),
            ActivePage::Create(_) => false,
        }
    }

    fn render(&self, env: &mut CommandEnv<'_>) -> anyhow::Result<()> {
        env.renderer.clear(env.out)?;
        match self {
            ActivePage::Home(page) => env.renderer.write_home(env.out, &page.view())?,
            ActivePage::Create(page) => env.renderer.write_create(env.out, &page.view())?,
            ActivePage::List(page) => env.renderer.write_day_list(env.out, &page.view())?,
        }
        writeln!(env.out)?;
        writeln!(env.out, "{HELP}")?;
        env.out.flush()?;
        Ok(())
    }
}

/// What a line command asks the loop to do next.
enum Flow {
    Redraw,
    Navigate(Route),
    Quit,
}

struct Session {
    page: ActivePage,
    redirect: Option<(Instant, Route)>,
}

/// Bulk delete prompt answered by the next input line.
struct LineConfirm<'a> {
    lines: &'a Receiver<String>,
    out: &'a mut dyn Write,
}

impl Confirm for LineConfirm<'_> {
    fn confirm(&mut self, prompt: &str) -> bool {
        if write!(self.out, "{prompt} [y/N] ").and_then(|_| self.out.flush()).is_err() {
            return false;
        }
        match self.lines.recv() {
            Ok(answer) => matches!(
                answer.trim().to_ascii_lowercase().as_str(),
                "y" | "yes" | "ya" | "ok"
            ),
            Err(_) => false,
        }
    }
}

/// Runs the session on the process's stdin.
pub fn run(env: &mut CommandEnv<'_>, start: Route, ticks: Option<u64>) -> anyhow::Result<()> {
    let (tx, lines) = mpsc::channel();
    std::thread::spawn(move || {
        for line in io::stdin().lock().lines() {
            let Ok(line) = line else { break };
            if tx.send(line).is_err() {
                break;
            }
        }
    });
    run_with(env, start, ticks, lines)
}

/// Runs the session on `lines`. Stops on `quit`, or after `ticks` clock
/// ticks when given.
#[instrument(skip(env, lines))]
pub fn run_with(
    env: &mut CommandEnv<'_>,
    start: Route,
    ticks: Option<u64>,
    lines: Receiver<String>,
) -> anyhow::Result<()> {
    let tick = env.cfg.clock_tick()?;
    let mut watcher = FileWatcher::new(&env.storage, &[TASKS_KEY, SELECTED_DATE_KEY])?;
    let mut session = Session {
        page: ActivePage::open(env, &start, today(env))?,
        redirect: None,
    };
    session.clock(env);
    session.page.render(env)?;

    let mut input_open = true;
    let mut elapsed = 0u64;
    let mut next_tick = Instant::now() + tick;

    loop {
        let wait = next_tick.saturating_duration_since(Instant::now());
        let mut dirty = false;

        if input_open {
            match lines.recv_timeout(wait) {
                Ok(line) => match session.handle_line(env, &lines, &line) {
                    Ok(Flow::Quit) => break,
                    Ok(Flow::Redraw) => dirty = true,
                    Ok(Flow::Navigate(route)) => {
                        session.navigate(env, &route)?;
                        dirty = true;
                    }
                    Err(err) => {
                        warn!(error = %err, line = %line, "command failed");
                        writeln!(env.out, "error: {err:#}")?;
                    }
                },
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {
                    debug!("input closed; watching only");
                    input_open = false;
                }
            }
        } else {
            std::thread::sleep(wait);
        }

        if let Some((due, route)) = session.redirect.take() {
            if Instant::now() >= due {
                session.navigate(env, &route)?;
                dirty = true;
            } else {
                session.redirect = Some((due, route));
            }
        }

        if Instant::now() >= next_tick {
            next_tick += tick;
            elapsed += 1;

            let external = watcher.poll()?;
            if !external.is_empty() {
                debug!(?external, "picked up external writes");
            }
            dirty |= session.page.pump();
            // The clock line changes every tick.
            dirty |= session.clock(env);

            if ticks.is_some_and(|limit| elapsed >= limit) {
                session.page.render(env)?;
                break;
            }
        }

        if dirty {
            session.page.render(env)?;
        }
    }

    info!(elapsed, "watch finished");
    Ok(())
}

fn today(env: &CommandEnv<'_>) -> NaiveDate {
    env.zone.today(Utc::now())
}

impl Session {
    fn clock(&mut self, env: &CommandEnv<'_>) -> bool {
        match &mut self.page {
            ActivePage::Home(page) => {
                page.tick(env.zone.wall_clock(Utc::now()));
                true
            }
            ActivePage::Create(_) | ActivePage::List(_) => false,
        }
    }

    fn navigate(&mut self, env: &CommandEnv<'_>, route: &Route) -> anyhow::Result<()> {
        self.redirect = None;
        self.page = ActivePage::open(env, route, today(env))?;
        self.clock(env);
        Ok(())
    }

    fn open_target(&self, name: &str) -> anyhow::Result<Route> {
        let route = match (name, &self.page) {
            ("home", _) => Route::Home,
            ("create", _) => Route::CreateTask,
            ("pending", ActivePage::Home(page)) => page.open_pending(),
            ("pending", _) => Route::Pending { date: None },
            ("completed", ActivePage::Home(page)) => page.open_completed(),
            ("completed", _) => Route::Completed { date: None },
            (other, _) => return Err(anyhow!("unknown page: {other}")),
        };
        Ok(route)
    }

    #[instrument(skip(self, env, lines))]
    fn handle_line(
        &mut self,
        env: &mut CommandEnv<'_>,
        lines: &Receiver<String>,
        line: &str,
    ) -> anyhow::Result<Flow> {
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            return Ok(Flow::Redraw);
        };
        let rest: Vec<&str> = words.collect();

        match verb {
            "quit" | "q" | "exit" => return Ok(Flow::Quit),
            "help" | "?" => {
                writeln!(env.out, "{HELP}")?;
                return Ok(Flow::Redraw);
            }
            "open" => {
                let name = rest.first().ok_or_else(|| anyhow!("open needs a page name"))?;
                return Ok(Flow::Navigate(self.open_target(name)?));
            }
            _ => {}
        }

        match (verb, &mut self.page) {
            ("prev", ActivePage::Home(page)) => {
                page.prev();
                Ok(Flow::Redraw)
            }
            ("next", ActivePage::Home(page)) => {
                page.next();
                Ok(Flow::Redraw)
            }
            ("prev", ActivePage::Create(page)) => {
                page.prev();
                Ok(Flow::Redraw)
            }
            ("next", ActivePage::Create(page)) => {
                page.next();
                Ok(Flow::Redraw)
            }
            ("prev", ActivePage::List(page)) => {
                page.prev()?;
                Ok(Flow::Redraw)
            }
            ("next", ActivePage::List(page)) => {
                page.next()?;
                Ok(Flow::Redraw)
            }

            ("pick", page) => {
                let raw = rest.first().ok_or_else(|| anyhow!("pick needs a date"))?;
                let date = parse_date_expr(raw, today(env))?;
                match page {
                    ActivePage::Home(page) => page.pick_day(date)?,
                    ActivePage::Create(page) => page.pick_day(date),
                    ActivePage::List(page) => page.pick_day(date)?,
                }
                Ok(Flow::Redraw)
            }

            ("mode", ActivePage::Home(page)) => {
                page.toggle_mode();
                Ok(Flow::Redraw)
            }
            ("toggle", ActivePage::Home(page)) => {
                let task = page.toggle_task(listed_index(&rest)?)?;
                debug!(id = task.id, completed = task.completed, "toggled from watch");
                Ok(Flow::Redraw)
            }
            ("delete", ActivePage::Home(page)) => {
                if page.delete_task(listed_index(&rest)?)?.is_none() {
                    writeln!(env.out, "Nothing deleted.")?;
                }
                Ok(Flow::Redraw)
            }
            ("clear", ActivePage::Home(page)) => {
                let mut confirm = LineConfirm {
                    lines,
                    out: &mut *env.out,
                };
                if let Some(count) = page.delete_all(&mut confirm)? {
                    info!(count, "cleared day from watch");
                }
                Ok(Flow::Redraw)
            }

            ("add", ActivePage::Create(page)) => {
                let (priority, name) = rest
                    .split_first()
                    .ok_or_else(|| anyhow!("add needs a priority and a name"))?;
                let form = TaskForm {
                    name: name.join(" "),
                    priority: Some(priority.parse::<Priority>()?),
                    ..TaskForm::default()
                };
                let outcome = match page.submit(&form, Utc::now()) {
                    Ok(outcome) => outcome,
                    Err(SubmitError::Invalid(err)) => return Err(anyhow!(err)),
                    Err(SubmitError::Store(err)) => return Err(err),
                };
                env.renderer.write_notice(env.out, outcome.notice)?;
                env.out.flush()?;
                if outcome.redirect.after.is_zero() {
                    return Ok(Flow::Navigate(outcome.redirect.to));
                }
                let due = Instant::now() + outcome.redirect.after;
                self.redirect = Some((due, outcome.redirect.to));
                Ok(Flow::Redraw)
            }

            (verb, _) => Err(anyhow!("'{verb}' is not available on this page")),
        }
    }
}

/// 1-based row number from the listing to an index.
fn listed_index(rest: &[&str]) -> anyhow::Result<usize> {
    let raw = rest.first().ok_or_else(|| anyhow!("expected a task number"))?;
    let n: usize = raw
        .parse()
        .map_err(|_| anyhow!("invalid task number: {raw}"))?;
    n.checked_sub(1)
        .ok_or_else(|| anyhow!("task numbers start at 1"))
}

#[cfg(test)]
mod tests {
    use std::io::Cursor;
    use std::sync::mpsc::Sender;

    use super::*;
    use crate::config::Config;
    use crate::datetime::Zone;
    use crate::render::Renderer;
    use crate::storage::Storage;
    use crate::store::TaskStore;
    use crate::task::Task;

    fn config() -> Config {
        let mut cfg = Config::defaults();
        cfg.apply_overrides([
            ("clock.tick.ms".to_string(), "5".to_string()),
            ("redirect.delay.ms".to_string(), "0".to_string()),
        ]);
        cfg
    }

    fn watch(storage: &Storage, start: Route, ticks: u64, input: &[&str]) -> String {
        let cfg = config();
        let renderer = Renderer::plain();
        let mut out = Vec::new();
        let mut stdin = Cursor::new(Vec::new());

        let (tx, rx): (Sender<String>, _) = mpsc::channel();
        for line in input {
            tx.send(line.to_string()).expect("send");
        }
        drop(tx);

        let mut env = CommandEnv {
            storage: storage.clone(),
            cfg: &cfg,
            renderer: &renderer,
            zone: Zone::Local,
            now: Utc::now(),
            out: &mut out,
            input: &mut stdin,
        };
        run_with(&mut env, start, Some(ticks), rx).expect("watch");
        String::from_utf8(out).expect("utf8")
    }

    #[test]
    fn add_from_create_page_redirects_home() {
        let storage = Storage::in_memory();
        let text = watch(&storage, Route::CreateTask, 1, &["add high Buy milk"]);

        assert!(text.contains("Task created successfully!"));
        let tasks = TaskStore::new(storage).load_all();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].name, "Buy milk");
        assert!(text.contains("Completed 0   Pending 1"));
    }

    #[test]
    fn unknown_commands_report_and_continue() {
        let storage = Storage::in_memory();
        let text = watch(&storage, Route::Completed { date: None }, 1, &["mode", "quit"]);
        assert!(text.contains("error: 'mode' is not available on this page"));
    }

    #[test]
    fn pending_page_lists_tasks_of_the_day() {
        let storage = Storage::in_memory();
        let today = Zone::Local.today(Utc::now());
        TaskStore::new(storage.fork())
            .create(Task::new_pending(
                7,
                "Buy milk".to_string(),
                Priority::Low,
                today,
                Utc::now(),
            ))
            .expect("create");

        let text = watch(&storage, Route::Pending { date: Some(today) }, 2, &[]);
        assert!(text.contains("Buy milk"));
    }

    #[test]
    fn row_numbers_are_one_based() {
        assert_eq!(listed_index(&["1"]).expect("index"), 0);
        assert!(listed_index(&["0"]).is_err());
        assert!(listed_index(&["x"]).is_err());
        assert!(listed_index(&[]).is_err());
    }
}
