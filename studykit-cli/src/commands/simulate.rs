//! Study simulation
//!
//! Drives the share button study through one browser window the way a tester
//! would by hand: install, copy from the address bar a few times, optionally
//! accept the install offer, optionally uninstall. Everything the study did
//! is printed afterwards.

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Result, anyhow};
use async_trait::async_trait;
use clap::Args;
use tracing::info;

use share_button_study::{PingLog, SUMMARY_FIELD, Study, StudyConfig, Treatment};
use studykit_host::{
    AreaLocation, Bootstrap, EligibilityCheck, HostContext, HostEvent, InMemoryBrowser, MemoryKv,
    PersistentKv, PingRecord, Reason, StartupOutcome, SurfaceId, TomlKv, TriggerContext, UiEffect,
};

use crate::config::ConfigLoader;

const WINDOW: SurfaceId = SurfaceId(1);

#[derive(Args)]
pub struct SimulateArgs {
    /// Treatment to force (canonical or legacy name)
    #[arg(long)]
    pub treatment: String,

    /// Start with the element already on the toolbar
    #[arg(long)]
    pub with_button: bool,

    /// Page shown when copying
    #[arg(long, default_value = "https://www.mozilla.org/en-US/firefox/")]
    pub url: String,

    /// Number of address bar copies
    #[arg(long, default_value_t = 1)]
    pub copies: u32,

    /// Accept the install offer after the copies
    #[arg(long)]
    pub accept_offer: bool,

    /// Uninstall the study at the end and send the summary
    #[arg(long)]
    pub uninstall: bool,

    /// Telemetry client identity
    #[arg(long, default_value = "simulated-client")]
    pub client_id: String,

    /// Persist preferences to this TOML file instead of memory
    #[arg(long)]
    pub prefs: Option<PathBuf>,

    /// Start as an application restart instead of a fresh install
    #[arg(long)]
    pub resume: bool,

    /// Fail the install-time eligibility check
    #[arg(long)]
    pub ineligible: bool,
}

/// Eligibility fixed on the command line.
struct FixedEligibility(bool);

#[async_trait]
impl EligibilityCheck for FixedEligibility {
    async fn is_eligible(&self) -> studykit_host::Result<bool> {
        Ok(self.0)
    }
}

/// Everything observable after a simulated run.
#[derive(Debug)]
pub struct SimulationReport {
    pub treatment: Treatment,
    pub startup: StartupOutcome,
    pub pings: Vec<PingRecord>,
    pub effects: Vec<UiEffect>,
    pub show_count: i64,
    pub summary: Option<PingRecord>,
}

impl fmt::Display for SimulationReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Treatment:  {}", self.treatment)?;
        writeln!(f, "Startup:    {:?}", self.startup)?;
        writeln!(f, "Show count: {}", self.show_count)?;
        writeln!(f)?;

        writeln!(f, "Pings ({}):", self.pings.len())?;
        for ping in &self.pings {
            writeln!(f, "  {}", ping)?;
        }
        writeln!(f)?;

        writeln!(f, "Effects ({}):", self.effects.len())?;
        for effect in &self.effects {
            writeln!(f, "  {}", effect)?;
        }

        if let Some(summary) = &self.summary {
            writeln!(f)?;
            writeln!(f, "Summary:")?;
            writeln!(f, "  {}", summary)?;
        }
        Ok(())
    }
}

pub async fn run(args: SimulateArgs) -> Result<()> {
    let config = ConfigLoader::load()?;
    let report = simulate(config, &args).await?;
    print!("{}", report);
    Ok(())
}

async fn simulate(config: StudyConfig, args: &SimulateArgs) -> Result<SimulationReport> {
    let treatment: Treatment = args.treatment.parse().map_err(|e: String| anyhow!(e))?;

    let browser = Arc::new(InMemoryBrowser::new(args.client_id.clone()));
    browser.open_window(WINDOW);
    if args.with_button {
        browser.place_element(Some(AreaLocation::Toolbar));
    }

    let prefs: Arc<dyn PersistentKv> = match &args.prefs {
        Some(path) => Arc::new(TomlKv::open(path)?),
        None => Arc::new(MemoryKv::new()),
    };
    prefs.set(&config.pref_keys().treatment, treatment.as_str().into())?;

    let host = HostContext::from_browser(browser.clone(), prefs)
        .with_eligibility(Arc::new(FixedEligibility(!args.ineligible)));
    let study = Study::open(config, host)?;

    let reason = if args.resume {
        Reason::AppStartup
    } else {
        Reason::Install
    };
    let startup = study.startup(reason).await?;
    info!(%treatment, ?startup, "Study started");

    if startup == StartupOutcome::Started {
        for _ in 0..args.copies {
            study
                .handle_event(HostEvent::Copy {
                    surface: WINDOW,
                    context: TriggerContext::copy(args.url.clone()),
                })
                .await;
        }
        if args.accept_offer {
            study
                .handle_event(HostEvent::OfferAccepted { surface: WINDOW })
                .await;
        }
    }

    let pings = study.ping_log().all().await?;
    let show_count = study.show_count()?;

    if args.uninstall {
        study.shutdown(Reason::Uninstall).await?;
    }

    let summary = browser
        .sent()
        .into_iter()
        .find(|r| r.get(SUMMARY_FIELD).is_some());

    Ok(SimulationReport {
        treatment,
        startup,
        pings,
        effects: browser.effects(),
        show_count,
        summary,
    })
}
