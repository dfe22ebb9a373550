use chrono::{Local, NaiveDate};
use clap::{Parser, Subcommand};
use color_eyre::{eyre::eyre, Result};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use kiden::backend::{Backend, RestBackend, Unconfigured};
use kiden::cache::{FailurePolicy, HookContext, SyncState};
use kiden::config::Config;
use kiden::event::{CacheEvent, EventHandler, Level};
use kiden::identity::Identity;
use kiden::logging;
use kiden::model::{HabitDraft, NoteDraft, Priority, ProjectDraft, TaskDraft, TaskPatch, TaskStatus};
use kiden::session::Session;
use kiden::store::SqliteStore;

#[derive(Parser, Debug)]
#[command(name = "kiden")]
#[command(about = "Tasks, habits, projects and notes with an optimistic local cache")]
#[command(version)]
struct Args {
  /// Path to config file (default: $XDG_CONFIG_HOME/kiden/config.yaml)
  #[arg(short, long)]
  config: Option<PathBuf>,

  /// Ignore any configured account and use the local guest store
  #[arg(long)]
  guest: bool,

  #[command(subcommand)]
  command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
  /// List and edit tasks
  Tasks {
    #[command(subcommand)]
    action: TaskAction,
  },
  /// List, add and log habits
  Habits {
    #[command(subcommand)]
    action: HabitAction,
  },
  /// List and add projects
  Projects {
    #[command(subcommand)]
    action: ProjectAction,
  },
  /// List and add notes
  Notes {
    #[command(subcommand)]
    action: NoteAction,
  },
  /// Show workspaces and the active workspace's collections
  Workspaces {
    /// Workspace to make active
    #[arg(long)]
    select: Option<String>,
  },
  /// Follow realtime changes until interrupted
  Watch,
}

#[derive(Subcommand, Debug)]
enum TaskAction {
  List,
  Add {
    title: String,
    #[arg(long)]
    project: Option<String>,
    /// low, medium or high
    #[arg(long, value_parser = parse_priority)]
    priority: Option<Priority>,
  },
  Done {
    id: String,
  },
  Rm {
    id: String,
  },
}

#[derive(Subcommand, Debug)]
enum HabitAction {
  List,
  Add {
    name: String,
    /// Daily target
    #[arg(long)]
    goal: Option<f64>,
    #[arg(long, default_value = "times")]
    unit: String,
  },
  Log {
    id: String,
    #[arg(default_value_t = 1.0)]
    value: f64,
    /// Day to log for (YYYY-MM-DD, default today)
    #[arg(long)]
    date: Option<NaiveDate>,
  },
}

#[derive(Subcommand, Debug)]
enum ProjectAction {
  List,
  Add { name: String },
}

#[derive(Subcommand, Debug)]
enum NoteAction {
  List,
  Add {
    title: String,
    #[arg(default_value = "")]
    content: String,
  },
}

fn parse_priority(value: &str) -> Result<Priority, String> {
  match value.to_lowercase().as_str() {
    "low" => Ok(Priority::Low),
    "medium" => Ok(Priority::Medium),
    "high" => Ok(Priority::High),
    other => Err(format!("unknown priority '{}'", other)),
  }
}

#[tokio::main]
async fn main() -> Result<()> {
  color_eyre::install()?;

  let args = Args::parse();

  let config = Config::load(args.config.as_deref())?;
  let data_dir = config.data_dir()?;
  let _log_guard = logging::init(&data_dir.join("logs"))?;

  let identity = if args.guest {
    Identity::Guest
  } else {
    config.identity(Config::get_access_token())
  };
  info!(identity = ?identity, "starting");

  let store = Arc::new(SqliteStore::open_at(&data_dir.join("guest.db"))?);
  let events = EventHandler::new();
  let policy = config.cache.failure_policy;

  match &config.backend {
    Some(remote) => {
      let backend = RestBackend::new(&remote.url, &remote.anon_key, identity.access_token())?;
      let context = hook_context(identity, backend, store, &events, policy);
      run(args.command, context, events).await
    }
    None => {
      let context = hook_context(identity, Unconfigured, store, &events, policy);
      run(args.command, context, events).await
    }
  }
}

fn hook_context<B: Backend>(
  identity: Identity,
  backend: B,
  store: Arc<SqliteStore>,
  events: &EventHandler,
  policy: FailurePolicy,
) -> HookContext<B, SqliteStore> {
  HookContext {
    identity,
    backend: Arc::new(backend),
    store,
    events: events.sender(),
    policy,
  }
}

async fn run<B: Backend>(
  command: Command,
  context: HookContext<B, SqliteStore>,
  mut events: EventHandler,
) -> Result<()> {
  if let Command::Watch = command {
    return watch(context, events).await;
  }

  let mut session = Session::open(context).await;
  session
    .ping()
    .await
    .map_err(|e| eyre!("Backend unreachable: {}", e))?;

  let result = execute(command, &mut session).await;

  for notice in events.notices() {
    eprintln!("{}", notice.message);
  }
  result
}

async fn execute<B: Backend>(command: Command, session: &mut Session<B, SqliteStore>) -> Result<()> {
  let today = Local::now().date_naive();

  match command {
    Command::Tasks { action } => match action {
      TaskAction::List => {
        for task in session.tasks().items() {
          let marker = match session.tasks().sync_state(&task.id) {
            SyncState::Synced => "",
            SyncState::Pending => " (saving)",
            SyncState::Failed => " (not saved)",
          };
          println!(
            "{}  [{:?}] {:?}  {}{}",
            task.id, task.status, task.priority, task.title, marker
          );
        }
      }
      TaskAction::Add {
        title,
        project,
        priority,
      } => {
        let mut draft = TaskDraft::new(title);
        if let Some(project) = project {
          draft = draft.in_project(project);
        }
        if let Some(priority) = priority {
          draft = draft.with_priority(priority);
        }
        let task = session.tasks().create(draft).await?;
        println!("{}", task.id);
      }
      TaskAction::Done { id } => {
        session
          .tasks()
          .update(&id, TaskPatch::status(TaskStatus::Done))
          .await?;
      }
      TaskAction::Rm { id } => session.tasks().delete(&id).await?,
    },

    Command::Habits { action } => {
      let tracker = session.habit_tracker();
      match action {
        HabitAction::List => {
          for habit in tracker.habits().items() {
            println!(
              "{}  {}  {}/{} {}  streak {}",
              habit.id,
              habit.name,
              tracker.total_for(&habit.id, today),
              habit.goal,
              habit.unit,
              tracker.streak(&habit.id, today)
            );
          }
        }
        HabitAction::Add { name, goal, unit } => {
          let mut draft = HabitDraft::new(name);
          if let Some(goal) = goal {
            draft = draft.with_goal(goal, unit);
          }
          let habit = tracker.habits().create(draft).await?;
          println!("{}", habit.id);
        }
        HabitAction::Log { id, value, date } => {
          let date = date.unwrap_or(today);
          tracker.log(&id, value, date).await?;
          println!(
            "{:.0}% of the day's goal",
            tracker.progress(&id, date) * 100.0
          );
        }
      }
    }

    Command::Projects { action } => match action {
      ProjectAction::List => {
        for project in session.projects().items() {
          println!("{}  [{:?}]  {}", project.id, project.status, project.name);
        }
      }
      ProjectAction::Add { name } => {
        let project = session.projects().create(ProjectDraft::new(name)).await?;
        println!("{}", project.id);
      }
    },

    Command::Notes { action } => match action {
      NoteAction::List => {
        for note in session.notes().items() {
          let pin = if note.pinned { "*" } else { " " };
          println!("{} {}  {}", pin, note.id, note.title);
        }
      }
      NoteAction::Add { title, content } => {
        let note = session.notes().create(NoteDraft::new(title, content)).await?;
        println!("{}", note.id);
      }
    },

    Command::Workspaces { select } => {
      let workspaces = session.workspaces_mut();
      if let Some(id) = select {
        workspaces.select(&id).await?;
      }
      let active = workspaces.active_id().map(String::from);
      for workspace in workspaces.available() {
        let marker = if Some(&workspace.id) == active.as_ref() { "*" } else { " " };
        println!("{} {}  {}", marker, workspace.id, workspace.name);
      }
      if let Some(collections) = workspaces.collections() {
        for collection in collections.items() {
          println!("    {}  {}", collection.id, collection.name);
        }
      }
    }

    Command::Watch => {}
  }

  Ok(())
}

async fn watch<B: Backend>(context: HookContext<B, SqliteStore>, mut events: EventHandler) -> Result<()> {
  if context.identity.is_guest() {
    return Err(eyre!("Realtime needs a signed-in account"));
  }

  let session = Session::start(context).await;
  println!("Watching for changes, Ctrl-C to stop");

  loop {
    tokio::select! {
      event = events.next() => match event {
        Some(CacheEvent::Changed { table }) => {
          let count = match table {
            "tasks" => session.tasks().len(),
            "habits" => session.habits().len(),
            "habit_logs" => session.habit_logs().len(),
            "projects" => session.projects().len(),
            "notes" => session.notes().len(),
            _ => continue,
          };
          println!("{}: {} items", table, count);
        }
        Some(CacheEvent::Notice(notice)) => match notice.level {
          Level::Error => eprintln!("{}", notice.message),
          Level::Info => println!("{}", notice.message),
        },
        None => break,
      },
      _ = tokio::signal::ctrl_c() => break,
    }
  }

  Ok(())
}
