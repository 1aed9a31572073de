use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context, Result};
use chrono::{Local, Utc};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, error, info, instrument, warn};

use tasks_domain::calendar::to_ics;
use tasks_domain::events::{self, AppEvent, ChannelSink, EventSender};
use tasks_domain::install::InstallChoice;
use tasks_domain::notifications::{LocalNotifier, PermissionState, ProviderKind};
use tasks_domain::service::LoadOutcome;
use tasks_domain::store::{FileStore, LocalStore, StoreError};
use tasks_domain::{
    AppContext, EventEffect, NotificationConfig, Platforms, Task, TaskId, TaskService, Toast,
    ToastLevel,
};
use tasks_worker::{
    BackgroundWorker, FetchOutcome, MemoryCacheStorage, MessageEffect, Request, WorkerConfig,
};

use crate::platform::{
    ChoicePrompter, HostedSubscriptionPlatform, HttpFetcher, RelayPushService,
    StoredPermissionBackend, TerminalNotifier,
};

pub const DEFAULT_VAPID_PUBLIC_KEY: &str =
    "BO2FX9UNFs438_24zaPhzwSxTGzgxwUdnk9UhdFOgRiyZ6uRF9ag3u0pIzNiP3WGN9G00Rv1TcGOCXV6KC4LNoY";

const STORE_FILE: &str = "store.json";

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct AppConfig {
    pub(crate) data_dir: PathBuf,
    pub(crate) app_id: String,
    pub(crate) subscription_key: Option<String>,
    pub(crate) subscription_url: String,
    pub(crate) push_relay_url: String,
    pub(crate) vapid_public_key: String,
    pub(crate) app_origin: String,
    /// Precache the app shell at startup. Only when an origin was configured.
    pub(crate) precache: bool,
}

impl AppConfig {
    pub fn from_env() -> Result<Self> {
        Ok(Self::from_lookup(|name| std::env::var(name).ok()))
    }

    pub(crate) fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let mut config = Self::default();
        let read = |name: &str| {
            lookup(name)
                .map(|value| value.trim().to_string())
                .filter(|value| !value.is_empty())
        };

        if let Some(dir) = read("TASKS_DATA_DIR") {
            config.data_dir = PathBuf::from(dir);
        }
        if let Some(app_id) = read("TASKS_APP_ID") {
            config.app_id = app_id;
        }
        config.subscription_key = read("TASKS_SUBSCRIPTION_KEY");
        if let Some(url) = read("TASKS_SUBSCRIPTION_URL").filter(|url| is_http_url(url)) {
            config.subscription_url = url;
        }
        if let Some(url) = read("TASKS_PUSH_RELAY_URL").filter(|url| is_http_url(url)) {
            config.push_relay_url = url;
        }
        if let Some(key) = read("TASKS_VAPID_PUBLIC_KEY") {
            config.vapid_public_key = key;
        }
        if let Some(origin) = read("TASKS_APP_ORIGIN").filter(|url| is_http_url(url)) {
            config.app_origin = origin;
            config.precache = true;
        }
        config
    }

    pub fn store_path(&self) -> PathBuf {
        self.data_dir.join(STORE_FILE)
    }

    pub(crate) fn notification_config(&self) -> NotificationConfig {
        NotificationConfig {
            app_id: self.app_id.clone(),
            subscription_key: self.subscription_key.clone(),
            vapid_public_key: self.vapid_public_key.clone(),
        }
    }

    pub(crate) fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            origin: self.app_origin.clone(),
            ..WorkerConfig::default()
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            data_dir: PathBuf::from(".tasks"),
            app_id: String::new(),
            subscription_key: None,
            subscription_url: "https://onesignal.com".to_string(),
            push_relay_url: "http://localhost:3000".to_string(),
            vapid_public_key: DEFAULT_VAPID_PUBLIC_KEY.to_string(),
            app_origin: "http://localhost:8080".to_string(),
            precache: false,
        }
    }
}

fn is_http_url(value: &str) -> bool {
    reqwest::Url::parse(value)
        .map(|url| matches!(url.scheme(), "http" | "https"))
        .unwrap_or(false)
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    Add(String),
    Toggle(TaskId),
    Delete(TaskId),
    List,
    Stats,
    NotifyOn,
    NotifyRevoke(ProviderKind),
    Push(String),
    Install(InstallChoice),
    Fetch(String),
    Message(String),
    Resubscribe,
    Export,
    Ics,
    Clear,
    Samples,
    Help,
    Quit,
}

impl Command {
    /// Parses one input line. Blank lines yield `None`.
    pub fn parse(line: &str) -> Result<Option<Self>> {
        let line = line.trim();
        if line.is_empty() {
            return Ok(None);
        }
        let (verb, rest) = match line.split_once(char::is_whitespace) {
            Some((verb, rest)) => (verb, rest.trim()),
            None => (line, ""),
        };

        let command = match verb.to_ascii_lowercase().as_str() {
            "add" => {
                if rest.is_empty() {
                    bail!("usage: add <text>");
                }
                Command::Add(rest.to_string())
            }
            "toggle" => Command::Toggle(parse_id(rest)?),
            "delete" | "rm" => Command::Delete(parse_id(rest)?),
            "list" | "ls" => Command::List,
            "stats" => Command::Stats,
            "notify" => match rest.split_once(char::is_whitespace) {
                None if rest.eq_ignore_ascii_case("on") => Command::NotifyOn,
                Some((action, provider)) if action.eq_ignore_ascii_case("revoke") => {
                    Command::NotifyRevoke(provider.parse().map_err(|err: String| anyhow!(err))?)
                }
                _ => bail!("usage: notify on | notify revoke <provider>"),
            },
            "push" => Command::Push(rest.to_string()),
            "install" => Command::Install(match rest.to_ascii_lowercase().as_str() {
                "" | "yes" | "y" => InstallChoice::Accepted,
                "no" | "n" => InstallChoice::Dismissed,
                _ => bail!("usage: install [yes|no]"),
            }),
            "fetch" => {
                if rest.is_empty() {
                    bail!("usage: fetch <path>");
                }
                Command::Fetch(rest.to_string())
            }
            "message" => {
                if rest.is_empty() {
                    bail!("usage: message <json>");
                }
                Command::Message(rest.to_string())
            }
            "resubscribe" => Command::Resubscribe,
            "export" => Command::Export,
            "ics" => Command::Ics,
            "clear" => Command::Clear,
            "samples" => Command::Samples,
            "help" | "?" => Command::Help,
            "quit" | "exit" | "q" => Command::Quit,
            other => bail!("unknown command `{other}`, try `help`"),
        };
        Ok(Some(command))
    }
}

fn parse_id(raw: &str) -> Result<TaskId> {
    raw.parse()
        .with_context(|| format!("`{raw}` is not a task id"))
}

const HELP: &str = "\
commands:
  add <text>                 add a task
  toggle <id>                mark a task done or pending
  delete <id>                remove a task
  list                       show all tasks
  stats                      task counters
  notify on                  enable notifications
  notify revoke <provider>   revoke subscription, web-push or local
  push <json>                simulate an incoming push message
  install [yes|no]           answer the install prompt
  fetch <path>               request a path through the offline cache
  message <json>             post a control message to the worker
  resubscribe                renew the web push subscription
  export                     print all data as JSON
  ics                        print tasks as an iCalendar file
  clear                      delete every task
  samples                    add sample tasks
  quit";

/// Output of one command.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Reply {
    pub lines: Vec<String>,
    pub quit: bool,
}

impl Reply {
    fn toasts(toasts: impl IntoIterator<Item = Toast>) -> Self {
        Self {
            lines: toasts.into_iter().map(|toast| render_toast(&toast)).collect(),
            quit: false,
        }
    }

    fn text(text: impl Into<String>) -> Self {
        Self {
            lines: vec![text.into()],
            quit: false,
        }
    }
}

pub fn render_toast(toast: &Toast) -> String {
    let level = match toast.level {
        ToastLevel::Info => "info",
        ToastLevel::Success => "ok",
        ToastLevel::Warning => "warn",
        ToastLevel::Error => "error",
    };
    format!("[{level}] {}", toast.message)
}

pub fn render_task(task: &Task) -> String {
    let mark = if task.completed { 'x' } else { ' ' };
    let created = task.created_at.with_timezone(&Local).format("%Y-%m-%d %H:%M");
    format!("[{mark}] {:>3}  {}  ({created})", task.id, task.text)
}

/// Everything a command can touch.
pub struct Shell {
    tasks: TaskService,
    context: Arc<AppContext>,
    worker: BackgroundWorker,
    notifier: Arc<dyn LocalNotifier>,
    store: Arc<dyn LocalStore>,
    events: EventSender,
}

impl Shell {
    pub fn new(
        store: Arc<dyn LocalStore>,
        context: Arc<AppContext>,
        worker: BackgroundWorker,
        events: EventSender,
    ) -> Self {
        let tasks = TaskService::builder()
            .with_store(Arc::clone(&store))
            .with_notification_sink(Box::new(ChannelSink::new(events.clone())))
            .build();
        let notifier = context.local_notifier();
        Self {
            tasks,
            context,
            worker,
            notifier,
            store,
            events,
        }
    }

    pub fn tasks(&self) -> &TaskService {
        &self.tasks
    }

    pub fn context(&self) -> &AppContext {
        &self.context
    }

    pub fn worker(&self) -> &BackgroundWorker {
        &self.worker
    }

    #[instrument(skip(self))]
    pub async fn execute(&self, command: Command) -> Reply {
        match command {
            Command::Add(text) => match self.tasks.create_task(&text) {
                Ok(change) => Reply::toasts(change.toasts),
                Err(err) => Reply::toasts([Toast::warning(err.to_string())]),
            },
            Command::Toggle(id) => match self.tasks.toggle_task(id) {
                Ok(change) => Reply::toasts(change.toasts),
                Err(err) => Reply::toasts([Toast::warning(err.to_string())]),
            },
            Command::Delete(id) => match self.tasks.delete_task(id) {
                Ok(change) => Reply::toasts(change.toasts),
                Err(err) => Reply::toasts([Toast::warning(err.to_string())]),
            },
            Command::List => {
                let tasks = self.tasks.tasks();
                if tasks.is_empty() {
                    return Reply::text("No tasks yet. Add one with `add <text>`.");
                }
                Reply {
                    lines: tasks.iter().map(render_task).collect(),
                    quit: false,
                }
            }
            Command::Stats => {
                let stats = self.tasks.stats();
                let mut reply = Reply::text(format!(
                    "{} tasks, {} completed, {} pending",
                    stats.total,
                    stats.completed,
                    stats.pending()
                ));
                for (provider, ready, permission) in self.context.provider_status() {
                    let ready = if ready { "ready" } else { "not ready" };
                    reply
                        .lines
                        .push(format!("  {provider:<12} {ready:<9} permission {permission}"));
                }
                reply
            }
            Command::NotifyOn => Reply::toasts(self.context.enable_notifications().await),
            Command::NotifyRevoke(provider) => self.revoke(provider),
            Command::Push(payload) => self.simulate_push(&payload).await,
            Command::Install(choice) => {
                let toast = self.context.install(&ChoicePrompter(choice)).await;
                if toast.level == ToastLevel::Success {
                    self.post(AppEvent::AppInstalled);
                }
                Reply::toasts([toast])
            }
            Command::Fetch(path) => self.fetch(path).await,
            Command::Message(raw) => self.message(&raw).await,
            Command::Resubscribe => {
                self.post(AppEvent::SubscriptionChanged);
                Reply::default()
            }
            Command::Export => match serde_json::to_string_pretty(&self.tasks.export_snapshot()) {
                Ok(json) => Reply::text(json),
                Err(err) => Reply::toasts([Toast::error(format!("Export failed: {err}"))]),
            },
            Command::Ics => Reply::text(to_ics(&self.tasks.tasks(), Utc::now())),
            Command::Clear => Reply::toasts(self.tasks.clear_all()),
            Command::Samples => Reply::toasts(self.tasks.add_sample_tasks()),
            Command::Help => Reply::text(HELP),
            Command::Quit => Reply {
                lines: Vec::new(),
                quit: true,
            },
        }
    }

    /// Records the denial and reports it the way the platform would.
    fn revoke(&self, provider: ProviderKind) -> Reply {
        let backend = StoredPermissionBackend::new(Arc::clone(&self.store), provider);
        if let Err(err) = backend.record(PermissionState::Denied) {
            let message = format!("{err:#}");
            warn!(%provider, err = %message, "could not persist revoked permission");
        }
        self.post(AppEvent::PermissionChanged {
            provider,
            state: PermissionState::Denied,
        });
        Reply::default()
    }

    fn post(&self, event: AppEvent) {
        if self.events.send(event).is_err() {
            debug!("event channel closed");
        }
    }

    async fn simulate_push(&self, payload: &str) -> Reply {
        let payload = (!payload.is_empty()).then(|| payload.as_bytes());
        let notification = self.worker.handle_push(payload);
        if let Err(err) = self.notifier.show(&notification).await {
            let message = format!("{err:#}");
            warn!(err = %message, "could not show push notification");
            return Reply::toasts([Toast::error("Could not show notification")]);
        }
        let resolution = self.worker.handle_click(None, &[]);
        Reply::text(format!("click would resolve to {resolution:?}"))
    }

    async fn message(&self, raw: &str) -> Reply {
        match self.worker.handle_message(raw) {
            Ok(MessageEffect::Activated { removed }) if removed.is_empty() => {
                Reply::text("worker active")
            }
            Ok(MessageEffect::Activated { removed }) => {
                Reply::text(format!("worker active, removed {}", removed.join(", ")))
            }
            Ok(MessageEffect::Show(notification)) => {
                match self.notifier.show(&notification).await {
                    Ok(()) => Reply::default(),
                    Err(err) => {
                        let message = format!("{err:#}");
                        warn!(err = %message, "could not show notification");
                        Reply::toasts([Toast::error("Could not show notification")])
                    }
                }
            }
            Err(err) => Reply::toasts([Toast::warning(err.to_string())]),
        }
    }

    async fn fetch(&self, path: String) -> Reply {
        match self.worker.handle_fetch(&Request::navigate(path)).await {
            FetchOutcome::Passthrough => Reply::text("not intercepted"),
            FetchOutcome::Cached(response) => {
                Reply::text(format!("cache hit, {} bytes", response.body.len()))
            }
            FetchOutcome::Network(response) => Reply::text(format!(
                "network {}, {} bytes",
                response.status,
                response.body.len()
            )),
            FetchOutcome::Fallback(response) => {
                Reply::text(format!("offline, served {}", response.url))
            }
            FetchOutcome::Failed(reason) => {
                Reply::toasts([Toast::error(format!("Fetch failed: {reason}"))])
            }
        }
    }
}

fn print_reply(reply: &Reply) {
    for line in &reply.lines {
        println!("{line}");
    }
}

pub fn build_shell(
    config: &AppConfig,
    store: Arc<dyn LocalStore>,
    events: EventSender,
) -> Result<Shell> {
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(15))
        .build()
        .context("failed to build HTTP client")?;

    let platforms = Platforms {
        subscription: Arc::new(HostedSubscriptionPlatform::new(
            client.clone(),
            config.subscription_url.clone(),
            Arc::clone(&store),
        )),
        push: Arc::new(RelayPushService::new(
            client.clone(),
            config.push_relay_url.clone(),
        )),
        push_permission: Arc::new(StoredPermissionBackend::new(
            Arc::clone(&store),
            ProviderKind::WebPush,
        )),
        notifier: Arc::new(TerminalNotifier),
        local_permission: Arc::new(StoredPermissionBackend::new(
            Arc::clone(&store),
            ProviderKind::Local,
        )),
    };
    let context = Arc::new(AppContext::new(
        Arc::clone(&store),
        config.notification_config(),
        platforms,
    ));
    let worker = BackgroundWorker::new(
        config.worker_config(),
        Arc::new(MemoryCacheStorage::new()),
        Arc::new(HttpFetcher::new(client, config.app_origin.clone())),
    );
    Ok(Shell::new(store, context, worker, events))
}

/// Opens the store file. A file that is not valid JSON is moved aside and
/// replaced by an empty store; the returned toast tells the user.
pub fn open_store(path: &Path) -> Result<(FileStore, Option<Toast>)> {
    let err = match FileStore::open(path) {
        Ok(store) => return Ok((store, None)),
        Err(StoreError::Serialization(err)) => err,
        Err(err) => {
            return Err(err).with_context(|| format!("failed to open store at {}", path.display()))
        }
    };

    let mut aside = path.as_os_str().to_owned();
    aside.push(".corrupt");
    let aside = PathBuf::from(aside);
    error!(
        path = %path.display(),
        aside = %aside.display(),
        %err,
        "store file is not valid JSON, starting with an empty store"
    );
    fs::rename(path, &aside)
        .with_context(|| format!("failed to move {} aside", path.display()))?;
    let store = FileStore::open(path)
        .with_context(|| format!("failed to open store at {}", path.display()))?;
    let recovered = LoadOutcome::Recovered {
        reason: err.to_string(),
    };
    Ok((store, recovered.toast()))
}

pub async fn run(config: AppConfig) -> Result<()> {
    let store_path = config.store_path();
    let (store, recovered) = open_store(&store_path)?;
    info!(path = %store_path.display(), "opened store");
    if let Some(toast) = recovered {
        println!("{}", render_toast(&toast));
    }
    let store: Arc<dyn LocalStore> = Arc::new(store);

    let (sender, mut receiver) = events::channel();
    let shell = build_shell(&config, store, sender)?;
    shell.context().initialize().await;

    if config.precache {
        match shell.worker().install().await {
            Ok(_) => {
                if let Err(err) = shell.worker().activate() {
                    warn!(%err, "worker activation failed");
                }
            }
            Err(err) => warn!(%err, "offline cache unavailable"),
        }
    }
    shell.post(AppEvent::InstallPromptAvailable);

    if let Some(toast) = shell.tasks().last_load().toast() {
        println!("{}", render_toast(&toast));
    }
    print_reply(&shell.execute(Command::List).await);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line.context("failed to read input")? else {
                    break;
                };
                match Command::parse(&line) {
                    Ok(Some(command)) => {
                        let reply = shell.execute(command).await;
                        print_reply(&reply);
                        if reply.quit {
                            break;
                        }
                    }
                    Ok(None) => {}
                    Err(err) => println!("{}", render_toast(&Toast::warning(err.to_string()))),
                }
            }
            Some(event) = receiver.recv() => {
                match shell.context().handle_event(event).await {
                    EventEffect::Dispatched(handle) => {
                        tokio::spawn(async move {
                            match handle.await {
                                Ok(report) => {
                                    debug!(delivered_by = ?report.delivered_by, "dispatch finished")
                                }
                                Err(err) => warn!(%err, "dispatch task failed"),
                            }
                        });
                    }
                    EventEffect::Toast(toast) => println!("{}", render_toast(&toast)),
                    EventEffect::None => {}
                }
            }
        }
    }
    info!("bye");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use tasks_domain::notifications::{AttemptOutcome, SkipReason};
    use tasks_domain::store::MemoryStore;

    #[test]
    fn config_reads_known_variables_and_ignores_bad_values() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("TASKS_DATA_DIR", "/tmp/tasks"),
            ("TASKS_APP_ID", " app-1 "),
            ("TASKS_SUBSCRIPTION_KEY", ""),
            ("TASKS_PUSH_RELAY_URL", "not a url"),
            ("TASKS_APP_ORIGIN", "https://tasks.example"),
        ]);
        let config = AppConfig::from_lookup(|name| env.get(name).map(|value| value.to_string()));

        assert_eq!(config.store_path(), PathBuf::from("/tmp/tasks/store.json"));
        assert_eq!(config.app_id, "app-1");
        assert_eq!(config.subscription_key, None);
        assert_eq!(config.push_relay_url, AppConfig::default().push_relay_url);
        assert_eq!(config.app_origin, "https://tasks.example");
        assert!(config.precache);
        assert_eq!(config.vapid_public_key, DEFAULT_VAPID_PUBLIC_KEY);
    }

    #[test]
    fn defaults_do_not_precache() {
        let config = AppConfig::from_lookup(|_| None);
        assert_eq!(config, AppConfig::default());
        assert!(!config.precache);
    }

    #[test]
    fn parses_commands() {
        assert_eq!(Command::parse("   ").unwrap(), None);
        assert_eq!(
            Command::parse("add  Buy milk ").unwrap(),
            Some(Command::Add("Buy milk".into()))
        );
        assert_eq!(Command::parse("toggle 3").unwrap(), Some(Command::Toggle(3)));
        assert_eq!(
            Command::parse("notify revoke web-push").unwrap(),
            Some(Command::NotifyRevoke(ProviderKind::WebPush))
        );
        assert_eq!(Command::parse("NOTIFY on").unwrap(), Some(Command::NotifyOn));
        assert_eq!(
            Command::parse("install no").unwrap(),
            Some(Command::Install(InstallChoice::Dismissed))
        );
        assert_eq!(
            Command::parse("push {\"title\":\"Hi\"}").unwrap(),
            Some(Command::Push("{\"title\":\"Hi\"}".into()))
        );

        assert_eq!(
            Command::parse("message {\"type\":\"SKIP_WAITING\"}").unwrap(),
            Some(Command::Message("{\"type\":\"SKIP_WAITING\"}".into()))
        );
        assert_eq!(Command::parse("resubscribe").unwrap(), Some(Command::Resubscribe));

        assert!(Command::parse("add").is_err());
        assert!(Command::parse("message").is_err());
        assert!(Command::parse("toggle abc").is_err());
        assert!(Command::parse("notify revoke carrier-pigeon").is_err());
        assert!(Command::parse("dance").is_err());
    }

    #[test]
    fn renders_tasks_and_toasts() {
        let mut task = Task::new(7, "Water plants", Utc::now());
        assert!(render_task(&task).starts_with("[ ]   7  Water plants"));
        task.toggle();
        assert!(render_task(&task).starts_with("[x]"));
        assert_eq!(render_toast(&Toast::success("Task added")), "[ok] Task added");
    }

    fn test_shell(sender: EventSender) -> Shell {
        let config = AppConfig {
            vapid_public_key: String::new(),
            ..AppConfig::default()
        };
        build_shell(&config, Arc::new(MemoryStore::new()), sender).unwrap()
    }

    async fn next_effect(shell: &Shell, receiver: &mut events::EventReceiver) -> EventEffect {
        let event = receiver.try_recv().expect("pending event");
        shell.context().handle_event(event).await
    }

    #[tokio::test]
    async fn commands_drive_notifications_through_the_context() {
        let store: Arc<dyn LocalStore> = Arc::new(MemoryStore::new());
        let config = AppConfig {
            vapid_public_key: String::new(),
            ..AppConfig::default()
        };
        let (sender, mut receiver) = events::channel();
        let shell = build_shell(&config, Arc::clone(&store), sender).unwrap();
        shell.context().initialize().await;

        let reply = shell.execute(Command::NotifyOn).await;
        assert_eq!(reply.lines, vec!["[ok] Notifications via local enabled"]);

        let reply = shell.execute(Command::Add("Buy milk".into())).await;
        assert_eq!(reply.lines, vec!["[ok] Task added"]);
        let EventEffect::Dispatched(handle) = next_effect(&shell, &mut receiver).await else {
            panic!("expected a dispatch");
        };
        let report = handle.await.unwrap();
        assert_eq!(report.delivered_by, Some(ProviderKind::Local));

        shell.execute(Command::NotifyRevoke(ProviderKind::Local)).await;
        let EventEffect::Toast(toast) = next_effect(&shell, &mut receiver).await else {
            panic!("expected a permission toast");
        };
        assert_eq!(toast.message, "Notifications via local: denied");

        shell.execute(Command::Add("Call dentist".into())).await;
        let EventEffect::Dispatched(handle) = next_effect(&shell, &mut receiver).await else {
            panic!("expected a dispatch");
        };
        let report = handle.await.unwrap();
        assert!(!report.delivered());
        assert_eq!(
            report.attempts.last().map(|attempt| &attempt.outcome),
            Some(&AttemptOutcome::Skipped(SkipReason::NotPermitted))
        );
        assert_eq!(shell.tasks().stats().total, 2);
        assert_eq!(
            store.get("permission:local").unwrap().as_deref(),
            Some("\"denied\"")
        );
    }

    #[tokio::test]
    async fn install_prompt_is_single_use() {
        let (sender, mut receiver) = events::channel();
        let shell = test_shell(sender);

        let reply = shell.execute(Command::Install(InstallChoice::Accepted)).await;
        assert_eq!(reply.lines, vec!["[info] Installation is not available"]);

        shell.post(AppEvent::InstallPromptAvailable);
        next_effect(&shell, &mut receiver).await;
        let reply = shell.execute(Command::Install(InstallChoice::Dismissed)).await;
        assert_eq!(reply.lines, vec!["[info] Installation cancelled"]);
        let reply = shell.execute(Command::Install(InstallChoice::Accepted)).await;
        assert_eq!(reply.lines, vec!["[info] Installation is not available"]);
    }

    #[tokio::test]
    async fn accepted_install_is_announced_once() {
        let (sender, mut receiver) = events::channel();
        let shell = test_shell(sender);
        shell.post(AppEvent::InstallPromptAvailable);
        next_effect(&shell, &mut receiver).await;

        let reply = shell.execute(Command::Install(InstallChoice::Accepted)).await;
        assert_eq!(reply.lines, vec!["[ok] App installed"]);
        assert!(matches!(
            next_effect(&shell, &mut receiver).await,
            EventEffect::None
        ));
        assert!(receiver.try_recv().is_err());
    }

    #[tokio::test]
    async fn message_command_reaches_the_worker() {
        let (sender, _receiver) = events::channel();
        let shell = test_shell(sender);

        let reply = shell
            .execute(Command::Message(r#"{"type":"SKIP_WAITING"}"#.into()))
            .await;
        assert_eq!(
            reply.lines,
            vec!["[warn] worker must be installed before it can activate"]
        );

        let reply = shell
            .execute(Command::Message(
                r#"{"type":"SHOW_NOTIFICATION","notification":{"title":"Hi","body":"there"}}"#
                    .into(),
            ))
            .await;
        assert!(reply.lines.is_empty());

        let reply = shell.execute(Command::Message("{".into())).await;
        assert_eq!(reply.lines, vec!["[warn] malformed control message"]);
    }

    #[tokio::test]
    async fn resubscribe_posts_a_subscription_change() {
        let (sender, mut receiver) = events::channel();
        let shell = test_shell(sender);

        let reply = shell.execute(Command::Resubscribe).await;
        assert!(reply.lines.is_empty());
        let EventEffect::Toast(toast) = next_effect(&shell, &mut receiver).await else {
            panic!("expected a subscription toast");
        };
        assert_eq!(toast, Toast::warning("Push subscription failed"));
    }

    #[test]
    fn unreadable_store_is_moved_aside() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(STORE_FILE);
        fs::write(&path, "{ definitely not json").unwrap();

        let (store, toast) = open_store(&path).unwrap();
        let toast = toast.expect("recovery is reported");
        assert_eq!(toast.level, ToastLevel::Warning);
        assert_eq!(
            fs::read_to_string(dir.path().join("store.json.corrupt")).unwrap(),
            "{ definitely not json"
        );

        let store: Arc<dyn LocalStore> = Arc::new(store);
        let tasks = TaskService::builder().with_store(Arc::clone(&store)).build();
        assert_eq!(tasks.last_load(), &LoadOutcome::Empty);
        assert_eq!(tasks.create_task("Water plants").unwrap().task.id, 1);
        assert!(fs::read_to_string(&path).unwrap().contains("Water plants"));

        let (_, toast) = open_store(&path).unwrap();
        assert_eq!(toast, None);
    }

    #[tokio::test]
    async fn push_command_shows_the_merged_notification() {
        let (sender, _receiver) = events::channel();
        let shell = test_shell(sender);
        let reply = shell
            .execute(Command::Push(r#"{"title":"Reminder","body":"Water plants"}"#.into()))
            .await;
        assert_eq!(reply.lines, vec!["click would resolve to Open { url: \"/\" }"]);
    }
}
