use std::io::{BufRead, Write};
use std::time::Duration;

use anyhow::{Context, anyhow};
use chrono::{DateTime, NaiveDate, Utc};
use tracing::{debug, info, instrument};

use crate::cli::{Command, WatchPage};
use crate::config::Config;
use crate::datetime::{Zone, format_iso_date, parse_date_expr};
use crate::messages;
use crate::pages::{
    Confirm, CreateTaskPage, DayListPage, FixedAnswer, HomePage, ListKind, Route, SubmitError,
    TaskForm,
};
use crate::render::Renderer;
use crate::selected_date::SelectedDateChannel;
use crate::session;
use crate::storage::Storage;
use crate::store::TaskStore;
use crate::task::{Priority, TaskSelector};

/// Everything a command needs from the outside world.
pub struct CommandEnv<'a> {
    pub storage: Storage,
    pub cfg: &'a Config,
    pub renderer: &'a Renderer,
    pub zone: Zone,
    pub now: DateTime<Utc>,
    pub out: &'a mut dyn Write,
    pub input: &'a mut dyn BufRead,
}

impl CommandEnv<'_> {
    pub fn today(&self) -> NaiveDate {
        self.zone.today(self.now)
    }

    fn resolve_date(&self, raw: Option<&str>) -> anyhow::Result<Option<NaiveDate>> {
        raw.map(|raw| parse_date_expr(raw, self.today())).transpose()
    }
}

/// Reads the answer to a prompt from the command's input.
pub struct PromptConfirm<'a> {
    pub input: &'a mut dyn BufRead,
    pub out: &'a mut dyn Write,
}

impl Confirm for PromptConfirm<'_> {
    fn confirm(&mut self, prompt: &str) -> bool {
        if write!(self.out, "{prompt} [y/N] ").and_then(|_| self.out.flush()).is_err() {
            return false;
        }
        let mut answer = String::new();
        if self.input.read_line(&mut answer).is_err() {
            return false;
        }
        matches!(
            answer.trim().to_ascii_lowercase().as_str(),
            "y" | "yes" | "ya" | "ok"
        )
    }
}

#[instrument(skip(env, command))]
pub fn dispatch(env: &mut CommandEnv<'_>, command: Option<Command>) -> anyhow::Result<()> {
    let command = command.unwrap_or(Command::Home {
        date: None,
        month: false,
        months: None,
    });
    debug!(?command, "dispatching command");

    match command {
        Command::Home {
            date,
            month,
            months,
        } => cmd_home(env, date.as_deref(), month, months),
        Command::Add {
            priority,
            description,
            alert,
            date,
            name,
        } => cmd_add(
            env,
            TaskFormArgs {
                name: name.join(" "),
                description: description.unwrap_or_default(),
                priority,
                alert,
                date,
            },
        ),
        Command::Pending { date } => cmd_day_list(env, ListKind::Pending, date.as_deref()),
        Command::Completed { date } => cmd_day_list(env, ListKind::Completed, date.as_deref()),
        Command::Toggle { id } => cmd_toggle(env, id),
        Command::Delete { id } => cmd_delete(env, id),
        Command::Clear { date, yes } => cmd_clear(env, date.as_deref(), yes),
        Command::Select { date } => cmd_select(env, &date),
        Command::Open { url } => {
            let route = Route::from_url(&url).ok_or_else(|| anyhow!("unknown page: {url}"))?;
            render_route(env, &route)
        }
        Command::Export => cmd_export(env),
        Command::Watch { page, date, ticks } => cmd_watch(env, page, date.as_deref(), ticks),
        Command::Show => cmd_show(env),
    }
}

fn cmd_home(
    env: &mut CommandEnv<'_>,
    date: Option<&str>,
    month: bool,
    months: Option<i64>,
) -> anyhow::Result<()> {
    info!("command home");
    let mut page = HomePage::load(&env.storage, env.today());
    page.tick(env.zone.wall_clock(env.now));

    if month {
        page.toggle_mode();
    }
    if let Some(date) = env.resolve_date(date)? {
        page.pick_day(date)?;
    }
    for _ in 0..months.unwrap_or(0).unsigned_abs() {
        if months.unwrap_or(0) < 0 {
            page.prev();
        } else {
            page.next();
        }
    }

    env.renderer.write_home(env.out, &page.view())
}

struct TaskFormArgs {
    name: String,
    description: String,
    priority: Option<String>,
    alert: bool,
    date: Option<String>,
}

fn cmd_add(env: &mut CommandEnv<'_>, args: TaskFormArgs) -> anyhow::Result<()> {
    info!("command add");
    let priority = args
        .priority
        .as_deref()
        .map(str::parse::<Priority>)
        .transpose()?;
    let date = env.resolve_date(args.date.as_deref())?;

    let mut page = CreateTaskPage::load(&env.storage, env.today(), env.cfg.redirect_delay()?);
    if let Some(date) = date {
        page.pick_day(date);
    }

    let form = TaskForm {
        name: args.name,
        description: args.description,
        priority,
        alert_enabled: args.alert,
    };
    let outcome = match page.submit(&form, env.now) {
        Ok(outcome) => outcome,
        Err(SubmitError::Invalid(err)) => return Err(anyhow!(err)),
        Err(SubmitError::Store(err)) => return Err(err),
    };

    env.renderer.write_notice(env.out, outcome.notice)?;
    writeln!(
        env.out,
        "Created task {} on {}.",
        outcome.task.id,
        format_iso_date(outcome.task.date)
    )?;

    follow_redirect(env, &outcome.redirect.to, outcome.redirect.after)
}

fn follow_redirect(
    env: &mut CommandEnv<'_>,
    to: &Route,
    after: Duration,
) -> anyhow::Result<()> {
    if !after.is_zero() {
        env.out.flush()?;
        std::thread::sleep(after);
    }
    writeln!(env.out)?;
    render_route(env, to)
}

fn cmd_day_list(
    env: &mut CommandEnv<'_>,
    kind: ListKind,
    date: Option<&str>,
) -> anyhow::Result<()> {
    info!(?kind, "command day list");
    let query = env.resolve_date(date)?.map(format_iso_date);
    let page = DayListPage::load(kind, &env.storage, query.as_deref(), env.today());
    env.renderer.write_day_list(env.out, &page.view())
}

pub fn render_route(env: &mut CommandEnv<'_>, route: &Route) -> anyhow::Result<()> {
    debug!(url = %route.to_url(), "rendering route");
    match route {
        Route::Home => {
            let mut page = HomePage::load(&env.storage, env.today());
            page.tick(env.zone.wall_clock(env.now));
            env.renderer.write_home(env.out, &page.view())
        }
        Route::CreateTask => {
            let page = CreateTaskPage::load(&env.storage, env.today(), Duration::ZERO);
            env.renderer.write_create(env.out, &page.view())
        }
        Route::Pending { .. } | Route::Completed { .. } => {
            let page = DayListPage::load_route(route, &env.storage, env.today())
                .ok_or_else(|| anyhow!("not a list page: {}", route.to_url()))?;
            env.renderer.write_day_list(env.out, &page.view())
        }
    }
}

fn cmd_toggle(env: &mut CommandEnv<'_>, id: u64) -> anyhow::Result<()> {
    info!(id, "command toggle");
    let store = TaskStore::new(env.storage.clone());
    let task = store
        .toggle_completed(&TaskSelector::Id(id))?
        .ok_or_else(|| anyhow!("no task with id {id}"))?;
    let state = if task.completed { "completed" } else { "pending" };
    writeln!(env.out, "Task {id} '{}' is now {state}.", task.name)?;
    Ok(())
}

fn cmd_delete(env: &mut CommandEnv<'_>, id: u64) -> anyhow::Result<()> {
    info!(id, "command delete");
    let store = TaskStore::new(env.storage.clone());
    let task = store
        .delete_one(&TaskSelector::Id(id))?
        .ok_or_else(|| anyhow!("no task with id {id}"))?;
    writeln!(env.out, "Deleted task {id} '{}'.", task.name)?;
    Ok(())
}

fn cmd_clear(env: &mut CommandEnv<'_>, date: Option<&str>, yes: bool) -> anyhow::Result<()> {
    info!("command clear");
    let today = env.today();
    let date = match env.resolve_date(date)? {
        Some(date) => date,
        None => SelectedDateChannel::new(env.storage.clone())
            .get()
            .unwrap_or(today),
    };

    let prompt = messages::confirm_delete_all(&format_iso_date(date));
    let approved = if yes {
        FixedAnswer(true).confirm(&prompt)
    } else {
        PromptConfirm {
            input: &mut *env.input,
            out: &mut *env.out,
        }
        .confirm(&prompt)
    };
    let removed = if approved {
        Some(TaskStore::new(env.storage.clone()).delete_all_for_date(date)?)
    } else {
        info!(%date, "clear declined");
        None
    };

    match removed {
        Some(count) => writeln!(
            env.out,
            "Deleted {count} task(s) for {}.",
            format_iso_date(date)
        )?,
        None => writeln!(env.out, "Nothing deleted.")?,
    }
    Ok(())
}

fn cmd_select(env: &mut CommandEnv<'_>, raw: &str) -> anyhow::Result<()> {
    let date = parse_date_expr(raw, env.today())?;
    SelectedDateChannel::new(env.storage.clone()).set(date)?;
    writeln!(env.out, "Selected {}.", format_iso_date(date))?;
    Ok(())
}

fn cmd_export(env: &mut CommandEnv<'_>) -> anyhow::Result<()> {
    let tasks = TaskStore::new(env.storage.clone()).load_all();
    let json = serde_json::to_string_pretty(&tasks).context("failed to serialize export")?;
    writeln!(env.out, "{json}")?;
    Ok(())
}

fn cmd_watch(
    env: &mut CommandEnv<'_>,
    page: WatchPage,
    date: Option<&str>,
    ticks: Option<u64>,
) -> anyhow::Result<()> {
    let start = match page {
        WatchPage::Home => Route::Home,
        WatchPage::Create => Route::CreateTask,
        WatchPage::Pending => Route::Pending {
            date: env.resolve_date(date)?,
        },
        WatchPage::Completed => Route::Completed {
            date: env.resolve_date(date)?,
        },
    };
    session::run(env, start, ticks)
}

fn cmd_show(env: &mut CommandEnv<'_>) -> anyhow::Result<()> {
    let mut entries: Vec<_> = env.cfg.iter().collect();
    entries.sort();
    for (key, value) in entries {
        writeln!(env.out, "{key} = {value}")?;
    }
    Ok(())
}
