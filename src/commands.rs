use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use tracing::{info, warn};

use crate::core::config::IndexConfig;
use crate::core::error::{IndexError, IndexResult};
use crate::core::models::{Mod, ModStatus, ModVersion, Platform, SimpleMod};
use crate::core::repository::{GetSelfModsParams, ModSearchParams, ModSort};
use crate::core::session::{IndexService, LoginPoll, SessionState};

const DEFAULT_LOGIN_TIMEOUT_SECS: u64 = 300;

#[derive(Debug, Parser)]
#[command(name = "geode-index", version = env!("CARGO_PKG_VERSION"), about, long_about = None, propagate_version = true)]
pub struct Cli {
    /// Index API root. Overrides GEODE_INDEX_URL.
    #[arg(long, global = true)]
    pub url: Option<String>,
    /// Where the session is kept. Overrides GEODE_INDEX_DATA_DIR.
    #[arg(long, global = true)]
    pub data_dir: Option<PathBuf>,
    /// Print results as JSON.
    #[arg(long, global = true)]
    pub json: bool,
    #[command(subcommand)]
    pub cmd: Commands,
}

#[derive(Debug, Subcommand)]
pub enum Commands {
    #[command(alias = "s", about = "Search the index")]
    Search(SearchArg),
    #[command(about = "Show a mod")]
    Show { id: String },
    #[command(alias = "ls", about = "List the versions of a mod")]
    Versions {
        id: String,
        /// Resolve dependencies of every version.
        #[arg(long)]
        full: bool,
    },
    #[command(about = "Show a mod version, the latest if none is given")]
    Version {
        id: String,
        #[arg(value_name = "VERSION")]
        mod_version: Option<String>,
    },
    #[command(about = "Log in through GitHub")]
    Login {
        /// Seconds to wait for the code to be entered.
        #[arg(long, default_value_t = DEFAULT_LOGIN_TIMEOUT_SECS)]
        timeout: u64,
    },
    #[command(about = "Revoke the session token")]
    Logout {
        /// Revoke every token of the account.
        #[arg(long)]
        all: bool,
    },
    #[command(about = "Show the signed-in developer")]
    Whoami,
    #[command(about = "Change your display name")]
    Rename { display_name: String },
    #[command(about = "List your mods")]
    MyMods {
        /// Only validated (true) or unvalidated (false) mods.
        #[arg(long)]
        validated: Option<bool>,
    },
    #[command(about = "Feature or unfeature a mod (admin)")]
    Feature {
        id: String,
        #[arg(long)]
        off: bool,
    },
    #[command(about = "Change the review status of a version (admin)")]
    SetStatus {
        id: String,
        #[arg(value_name = "VERSION")]
        mod_version: String,
        status: ModStatus,
        /// Note sent along with the status.
        #[arg(long)]
        info: Option<String>,
    },
    #[command(about = "Submit a new mod from a release download link")]
    Create { download_link: String },
    #[command(about = "Publish a new version of a mod")]
    Publish { id: String, download_link: String },
    #[command(about = "Download a mod package, checking its hash")]
    Download {
        id: String,
        #[arg(value_name = "VERSION")]
        mod_version: Option<String>,
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

#[derive(Debug, Args)]
pub struct SearchArg {
    pub query: Option<String>,
    #[arg(long)]
    pub page: Option<u32>,
    #[arg(long)]
    pub per_page: Option<u32>,
    #[arg(long)]
    pub developer: Option<String>,
    #[arg(long = "tag")]
    pub tags: Vec<String>,
    #[arg(long = "platform")]
    pub platforms: Vec<Platform>,
    #[arg(long)]
    pub featured: Option<bool>,
    #[arg(long)]
    pub gd: Option<String>,
    #[arg(long)]
    pub sort: Option<ModSort>,
    /// Mods awaiting review (admin).
    #[arg(long)]
    pub pending: bool,
}

impl From<SearchArg> for ModSearchParams {
    fn from(arg: SearchArg) -> Self {
        Self {
            page: arg.page,
            per_page: arg.per_page,
            developer: arg.developer,
            pending_validation: arg.pending,
            featured: arg.featured,
            tags: arg.tags,
            platforms: arg.platforms,
            query: arg.query,
            gd: arg.gd,
            sort: arg.sort,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ModInfo {
    pub id: String,
    pub featured: bool,
    pub download_count: u64,
    pub tags: Vec<String>,
    pub owner: Option<String>,
    pub repository: Option<String>,
    pub about: Option<String>,
    pub versions: Vec<String>,
    pub updated_at: String,
}

impl From<&Mod> for ModInfo {
    fn from(m: &Mod) -> Self {
        Self {
            id: m.id().to_string(),
            featured: m.featured(),
            download_count: m.download_count(),
            tags: m.tags(),
            owner: m.developers().owner().map(|d| d.display_name.clone()),
            repository: m.repository().map(|u| u.to_string()),
            about: m.about(),
            versions: m
                .versions()
                .list()
                .iter()
                .map(|v| v.version().to_string())
                .collect(),
            updated_at: m.updated_at().to_rfc3339(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct VersionInfo {
    pub mod_id: String,
    pub version: String,
    pub name: String,
    pub status: ModStatus,
    pub geode: String,
    pub gd: Vec<(Platform, String)>,
    pub download_count: u64,
    pub download_url: Option<String>,
    pub dependencies: Option<Vec<String>>,
    pub incompatibilities: Option<Vec<String>>,
}

impl From<&ModVersion> for VersionInfo {
    fn from(v: &ModVersion) -> Self {
        let gd = v.gd();
        Self {
            mod_id: v.mod_id().to_string(),
            version: v.version().to_string(),
            name: v.name(),
            status: v.status(),
            geode: v.geode(),
            gd: gd
                .platforms()
                .into_iter()
                .filter_map(|p| gd.for_platform(p).map(|g| (p, g.to_string())))
                .collect(),
            download_count: v.download_count(),
            download_url: v.download_url().ok().map(|u| u.to_string()),
            dependencies: v.dependencies().map(|deps| {
                deps.iter()
                    .map(|d| format!("{} {} ({:?})", d.mod_id, d.version, d.importance))
                    .collect()
            }),
            incompatibilities: v.incompatibilities().map(|list| {
                list.iter()
                    .map(|i| format!("{} {} ({:?})", i.mod_id, i.version, i.importance))
                    .collect()
            }),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct SimpleModInfo {
    pub id: String,
    pub featured: bool,
    pub download_count: u64,
    pub versions: Vec<(String, bool)>,
}

impl From<&SimpleMod> for SimpleModInfo {
    fn from(m: &SimpleMod) -> Self {
        Self {
            id: m.id().to_string(),
            featured: m.featured(),
            download_count: m.download_count(),
            versions: m
                .versions()
                .list()
                .iter()
                .map(|v| (v.version().to_string(), v.validated()))
                .collect(),
        }
    }
}

fn config_for(cli: &Cli) -> IndexConfig {
    let mut config = IndexConfig::from_env();
    if let Some(url) = &cli.url {
        config = config.with_url(url.clone());
    }
    if let Some(dir) = &cli.data_dir {
        config = config.with_data_dir(dir.clone());
    }
    config
}

fn print_json<T: Serialize>(value: &T) -> IndexResult<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_mod(m: &ModInfo) {
    let star = if m.featured { " *" } else { "" };
    println!("{}{}  ({} downloads)", m.id, star, m.download_count);
    if let Some(owner) = &m.owner {
        println!("  by {}", owner);
    }
    if !m.tags.is_empty() {
        println!("  tags: {}", m.tags.join(", "));
    }
}

fn print_version(v: &VersionInfo) {
    println!("{} {} [{}]", v.mod_id, v.version, v.status);
    println!("  name: {}", v.name);
    println!("  geode: {}", v.geode);
    for (platform, gd) in &v.gd {
        println!("  gd {}: {}", platform, gd);
    }
    if let Some(deps) = &v.dependencies {
        for d in deps {
            println!("  depends on {}", d);
        }
    }
    if let Some(list) = &v.incompatibilities {
        for i in list {
            println!("  incompatible with {}", i);
        }
    }
}

fn require_login(service: &IndexService) -> IndexResult<()> {
    if service.is_logged_in() {
        Ok(())
    } else {
        Err(IndexError::Config(
            "not logged in, run `geode-index login` first".into(),
        ))
    }
}

pub async fn execute(cli: Cli) -> IndexResult<()> {
    let config = config_for(&cli);
    let service = IndexService::from_config(&config)?;

    if let Err(e) = service.restore().await {
        warn!("Could not restore session: {}", e);
    }

    let json = cli.json;
    match cli.cmd {
        Commands::Search(arg) => search(&service, arg.into(), json).await,
        Commands::Show { id } => show(&service, &id, json).await,
        Commands::Versions { id, full } => versions(&service, &id, full, json).await,
        Commands::Version { id, mod_version } => {
            version_info(&service, &id, mod_version.as_deref(), json).await
        }
        Commands::Login { timeout } => login(&service, Duration::from_secs(timeout)).await,
        Commands::Logout { all } => {
            if all {
                service.logout_all().await
            } else {
                service.logout().await
            }
        }
        Commands::Whoami => whoami(&service, json),
        Commands::Rename { display_name } => {
            require_login(&service)?;
            service.update_self(&display_name).await
        }
        Commands::MyMods { validated } => my_mods(&service, validated, json).await,
        Commands::Feature { id, off } => {
            let m = service.mods().get(&id).await?;
            m.set_featured(!off).await
        }
        Commands::SetStatus {
            id,
            mod_version,
            status,
            info,
        } => {
            let v = service.mods().versions().by_mod(&id).get(&mod_version).await?;
            v.set_status(status, info).await
        }
        Commands::Create { download_link } => service.mods().create(&download_link).await,
        Commands::Publish { id, download_link } => {
            service
                .mods()
                .versions()
                .by_mod(&id)
                .create(&download_link)
                .await
        }
        Commands::Download {
            id,
            mod_version,
            output,
        } => download(&service, &id, mod_version.as_deref(), output).await,
    }
}

async fn search(service: &IndexService, params: ModSearchParams, json: bool) -> IndexResult<()> {
    let page = service.mods().search(&params).await?;
    let infos: Vec<ModInfo> = page.data.iter().map(|m| ModInfo::from(m.as_ref())).collect();

    if json {
        return print_json(&infos);
    }

    println!("{} mods found", page.count);
    for info in &infos {
        print_mod(info);
    }
    Ok(())
}

async fn show(service: &IndexService, id: &str, json: bool) -> IndexResult<()> {
    let m = service.mods().get(id).await?.fetch().await?;
    let info = ModInfo::from(m.as_ref());

    if json {
        return print_json(&info);
    }

    print_mod(&info);
    if let Some(repo) = &info.repository {
        println!("  source: {}", repo);
    }
    println!("  versions: {}", info.versions.join(", "));
    if let Some(about) = &info.about {
        println!();
        println!("{}", about);
    }
    Ok(())
}

async fn versions(service: &IndexService, id: &str, full: bool, json: bool) -> IndexResult<()> {
    let m = service.mods().get(id).await?.fetch().await?;
    let list: Vec<Arc<ModVersion>> = if full {
        m.versions().fetch_all().await?
    } else {
        m.versions().list()
    };
    let infos: Vec<VersionInfo> = list.iter().map(|v| VersionInfo::from(v.as_ref())).collect();

    if json {
        return print_json(&infos);
    }

    for v in &infos {
        println!("{} [{}] geode {}", v.version, v.status, v.geode);
    }
    Ok(())
}

async fn version_info(
    service: &IndexService,
    id: &str,
    version: Option<&str>,
    json: bool,
) -> IndexResult<()> {
    let versions = service.mods().versions().by_mod(id);
    let v = match version {
        Some(version) => versions.get(version).await?,
        None => versions.latest().await?,
    };
    let v = v.fetch().await?;
    let info = VersionInfo::from(v.as_ref());

    if json {
        return print_json(&info);
    }
    print_version(&info);
    Ok(())
}

async fn login(service: &IndexService, timeout: Duration) -> IndexResult<()> {
    if let SessionState::LoggedIn(user) = service.state() {
        println!("Already logged in as {}", user.username);
        return Ok(());
    }

    let attempt = match service.active_login() {
        Some(attempt) => attempt,
        None => service.begin_login().await?,
    };
    println!("Open {} and enter the code {}", attempt.uri, attempt.code);

    let interval = Duration::from_secs(attempt.interval.max(1));
    let deadline = tokio::time::Instant::now() + timeout;

    while tokio::time::Instant::now() < deadline {
        tokio::time::sleep(interval).await;

        match service.poll_login().await? {
            LoginPoll::LoggedIn(_) => {
                if let Some(user) = service.user() {
                    println!("Logged in as {}", user.username);
                }
                return Ok(());
            }
            LoginPoll::Expired => {
                return Err(IndexError::Config(
                    "login attempt expired, run `geode-index login` again".into(),
                ));
            }
            LoginPoll::Pending => {}
        }
    }

    service.cancel_login();
    info!("Gave up waiting for login after {}s", timeout.as_secs());
    Err(IndexError::Config("timed out waiting for login".into()))
}

fn whoami(service: &IndexService, json: bool) -> IndexResult<()> {
    match service.state() {
        SessionState::LoggedIn(user) => {
            if json {
                #[derive(Serialize)]
                struct Me<'a> {
                    id: i64,
                    username: &'a str,
                    display_name: &'a str,
                    verified: bool,
                    admin: bool,
                }
                return print_json(&Me {
                    id: user.id,
                    username: &user.username,
                    display_name: &user.display_name,
                    verified: user.verified,
                    admin: user.admin,
                });
            }
            let role = if user.admin { " (admin)" } else { "" };
            println!("{} [{}]{}", user.display_name, user.username, role);
        }
        SessionState::LoginPending(attempt) => {
            println!("Login pending, enter {} at {}", attempt.code, attempt.uri);
        }
        SessionState::LoggedOut => println!("Not logged in"),
    }
    Ok(())
}

async fn my_mods(service: &IndexService, validated: Option<bool>, json: bool) -> IndexResult<()> {
    require_login(service)?;
    let mods = service
        .mods()
        .by_self(&GetSelfModsParams { validated })
        .await?;
    let infos: Vec<SimpleModInfo> = mods.iter().map(|m| SimpleModInfo::from(m.as_ref())).collect();

    if json {
        return print_json(&infos);
    }

    for m in &infos {
        println!("{} ({} downloads)", m.id, m.download_count);
        for (version, validated) in &m.versions {
            let mark = if *validated { "" } else { " (pending review)" };
            println!("  {}{}", version, mark);
        }
    }
    Ok(())
}

async fn download(
    service: &IndexService,
    id: &str,
    version: Option<&str>,
    output: Option<PathBuf>,
) -> IndexResult<()> {
    let versions = service.mods().versions().by_mod(id);
    let v = match version {
        Some(version) => versions.get(version).await?,
        None => versions.latest().await?,
    };

    let data = v.download().await?;
    let path = output.unwrap_or_else(|| PathBuf::from(format!("{}.geode", id)));
    tokio::fs::write(&path, &data)
        .await
        .map_err(|e| IndexError::Io {
            path: path.clone(),
            source: e,
        })?;

    println!("Saved {}@{} to {}", id, v.version(), path.display());
    Ok(())
}
