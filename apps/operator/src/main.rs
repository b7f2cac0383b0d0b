use std::{process::ExitCode, sync::Arc};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use client_core::{
    config, load_settings, parse_regions, ActionReport, ClientEvent, NewCampaign, NewLead,
    NewScript, OutreachClient, Snapshot,
};
use shared::domain::{CampaignId, InterestLevel, LeadId, StatusTone};
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(about = "Operator console for outbound lead calling")]
struct Cli {
    /// Overrides BACKEND_URL and outreach.toml for this run.
    #[arg(long)]
    backend_url: Option<String>,
    /// Seconds before an outstanding call or meeting request is abandoned; 0 waits forever.
    #[arg(long)]
    timeout: Option<u64>,
    /// Fixed UTC offset for meeting times, e.g. +05:30.
    #[arg(long)]
    timezone: Option<String>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Reload and print leads, campaigns and scripts.
    List,
    AddLead {
        #[arg(long)]
        name: String,
        #[arg(long)]
        phone: String,
        #[arg(long, default_value = "")]
        email: String,
        #[arg(long, default_value = "USA")]
        country: String,
        #[arg(long, default_value = "")]
        state: String,
        #[arg(long)]
        not_nri: bool,
        #[arg(long, default_value = "manual")]
        source: String,
        #[arg(long, value_enum, default_value_t = Interest::Medium)]
        interest: Interest,
        #[arg(long, default_value = "")]
        notes: String,
    },
    AddScript {
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        content: Option<String>,
        #[arg(long)]
        language: Option<String>,
    },
    AddCampaign {
        #[arg(long)]
        name: Option<String>,
        /// Comma-separated regions, e.g. "CA, NY, TX".
        #[arg(long)]
        regions: Option<String>,
        #[arg(long)]
        all_leads: bool,
    },
    Call {
        lead_id: String,
    },
    Meeting {
        lead_id: String,
        /// Local start, e.g. 2024-05-01T09:30.
        #[arg(long)]
        at: String,
        #[arg(long)]
        advisor: Option<String>,
        #[arg(long)]
        duration: Option<u32>,
        #[arg(long)]
        title: Option<String>,
        #[arg(long)]
        description: Option<String>,
    },
    Start {
        campaign_id: String,
    },
    Pause {
        campaign_id: String,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Interest {
    Low,
    Medium,
    High,
}

impl From<Interest> for InterestLevel {
    fn from(value: Interest) -> Self {
        match value {
            Interest::Low => InterestLevel::Low,
            Interest::Medium => InterestLevel::Medium,
            Interest::High => InterestLevel::High,
        }
    }
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).init();
    let cli = Cli::parse();

    let mut settings = load_settings();
    if let Some(raw) = &cli.backend_url {
        settings.backend_url = config::normalize_backend_url(raw)?;
    }
    if let Some(seconds) = cli.timeout {
        settings.action_timeout_seconds = seconds;
    }
    if let Some(zone) = cli.timezone {
        settings.meeting_timezone = Some(zone);
    }
    debug!(backend_url = %settings.backend_url, "operator: settings loaded");

    let client = OutreachClient::new(settings).context("failed to start outreach client")?;
    let mut events = client.subscribe_events();

    let ok = match cli.command {
        Command::List => {
            let loaded = client.refresh().await.is_ok();
            print_events(&mut events);
            print_snapshot(&client, &*client.snapshot().await).await;
            loaded
        }
        Command::AddLead {
            name,
            phone,
            email,
            country,
            state,
            not_nri,
            source,
            interest,
            notes,
        } => {
            let lead = NewLead {
                full_name: name,
                email,
                phone,
                country,
                state,
                nri: !not_nri,
                source,
                interest_level: interest.into(),
                notes,
            };
            let report = client.create_lead(&lead).await;
            finish(&mut events, report, |lead| println!("lead id: {}", lead.id))
        }
        Command::AddScript {
            title,
            content,
            language,
        } => {
            let defaults = NewScript::default();
            let script = NewScript {
                title: title.unwrap_or(defaults.title),
                content: content.unwrap_or(defaults.content),
                language: language.unwrap_or(defaults.language),
            };
            let report = client.create_script(&script).await;
            finish(&mut events, report, |created| {
                println!("script id: {}", created.id.as_deref().unwrap_or("-"))
            })
        }
        Command::AddCampaign {
            name,
            regions,
            all_leads,
        } => {
            let defaults = NewCampaign::default();
            let campaign = NewCampaign {
                name: name.unwrap_or(defaults.name),
                target_states: regions
                    .as_deref()
                    .map(parse_regions)
                    .unwrap_or(defaults.target_states),
                nri_only: !all_leads,
            };
            let report = client.create_campaign(&campaign).await;
            finish(&mut events, report, |created| {
                println!("campaign id: {}", created.id.as_deref().unwrap_or("-"))
            })
        }
        Command::Call { lead_id } => {
            let report = client.place_call(&LeadId::new(lead_id)).await;
            finish(&mut events, report, |initiated| {
                if !initiated.response.is_null() {
                    println!("backend: {}", initiated.response);
                }
            })
        }
        Command::Meeting {
            lead_id,
            at,
            advisor,
            duration,
            title,
            description,
        } => {
            let lead_id = LeadId::new(lead_id);
            client.open_meeting_draft(&lead_id).await;
            client
                .update_meeting_draft(&lead_id, |draft| {
                    draft.meeting_time = at;
                    if let Some(advisor) = advisor {
                        draft.senior_name = advisor;
                    }
                    if let Some(duration) = duration {
                        draft.duration_minutes = duration;
                    }
                    if let Some(title) = title {
                        draft.title = title;
                    }
                    if let Some(description) = description {
                        draft.description = description;
                    }
                })
                .await?;
            let report = client.schedule_meeting(&lead_id).await;
            finish(&mut events, report, |scheduled| {
                println!("starts at: {}", scheduled.starts_at.to_rfc3339());
                match &scheduled.join_link {
                    Some(link) => println!("join link: {link}"),
                    None => println!("join link: none returned"),
                }
            })
        }
        Command::Start { campaign_id } => {
            let report = client.start_campaign(&CampaignId::new(campaign_id)).await;
            finish(&mut events, report, |_| {})
        }
        Command::Pause { campaign_id } => {
            let report = client.pause_campaign(&CampaignId::new(campaign_id)).await;
            finish(&mut events, report, |_| {})
        }
    };

    Ok(if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn finish<T>(
    events: &mut broadcast::Receiver<ClientEvent>,
    report: ActionReport<T>,
    on_success: impl FnOnce(&T),
) -> bool {
    print_events(events);
    match &report.outcome {
        Ok(value) => {
            on_success(value);
            true
        }
        Err(_) => false,
    }
}

fn print_events(events: &mut broadcast::Receiver<ClientEvent>) {
    loop {
        match events.try_recv() {
            Ok(ClientEvent::Status(message)) => println!("{message}"),
            Ok(ClientEvent::Failure(message)) => eprintln!("error: {message}"),
            Ok(ClientEvent::StoreReconciled { generation }) => {
                debug!(generation, "operator: store reconciled")
            }
            Err(TryRecvError::Lagged(skipped)) => debug!(skipped, "operator: events lagged"),
            Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
        }
    }
}

async fn print_snapshot(client: &Arc<OutreachClient>, snapshot: &Snapshot) {
    if !snapshot.is_loaded() {
        return;
    }

    println!("Leads ({})", snapshot.leads.len());
    for lead in &snapshot.leads {
        let tone = match lead.status.tone() {
            StatusTone::Positive => "+",
            StatusTone::Negative => "-",
            StatusTone::Neutral => " ",
        };
        let meeting = client
            .meeting_link(&lead.id)
            .await
            .map(|link| format!("  meeting: {link}"))
            .unwrap_or_default();
        println!(
            "  {tone} {:<12} {:<24} {:<16} {}{}",
            lead.id, lead.full_name, lead.phone, lead.status, meeting
        );
    }

    println!("Campaigns ({})", snapshot.campaigns.len());
    for campaign in &snapshot.campaigns {
        println!(
            "  {:<12} {:<24} {:<10} regions={} nri_only={} next={}",
            campaign.id,
            campaign.name,
            campaign.status,
            campaign.target_states.join(","),
            campaign.nri_only,
            campaign.next_action().as_str()
        );
    }

    println!("Scripts ({})", snapshot.scripts.len());
    for script in &snapshot.scripts {
        println!("  {:<12} {} [{}]", script.id, script.title, script.language);
    }
}
