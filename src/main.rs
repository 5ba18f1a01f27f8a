mod config;
mod db;
mod driver;
mod error;
mod feed;
mod filters;
mod forms;
mod logging;
mod models;
mod observer;
mod remote;
mod session;
mod source;
mod tui;

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::info;

use config::Config;
use db::Database;
use driver::FeedDriver;
use error::AccessError;
use feed::{FeedController, FeedStatus};
use filters::FilterCriteria;
use forms::{JobForm, SignupForm};
use logging::LogConfig;
use models::{posted_ago, ApplicationStatus, JobPosting, JobType, LocationType, Role};
use remote::RestSource;
use session::{LocalAuth, SessionSnapshot, SessionStore};
use source::{JobSource, SqliteSource};

#[derive(Parser)]
#[command(name = "jobboard")]
#[command(about = "Job board - browse and apply to jobs, post jobs and manage applicants")]
struct Cli {
    /// Increase log verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Initialize the database
    Init,

    /// Create an account
    Signup {
        /// Full name
        full_name: String,

        /// Email address
        email: String,

        /// Account type
        #[arg(short, long, value_enum, default_value = "seeker")]
        role: Role,

        /// Company name (employers)
        #[arg(short, long)]
        company: Option<String>,
    },

    /// Sign in as an existing account
    Login {
        /// Email address
        email: String,
    },

    /// Sign out
    Logout,

    /// Show the signed-in account
    Whoami,

    /// Browse jobs
    Jobs {
        /// Match title or company
        #[arg(short, long, default_value = "")]
        search: String,

        /// Match location text
        #[arg(short, long, default_value = "")]
        location: String,

        /// Employment type (repeatable; none means all)
        #[arg(short = 't', long = "type", value_enum)]
        types: Vec<JobType>,

        /// Include remote jobs
        #[arg(long)]
        remote: bool,

        /// Include hybrid jobs
        #[arg(long)]
        hybrid: bool,

        /// Jobs per page
        #[arg(long, value_parser = config::parse_page_size)]
        page_size: Option<usize>,

        /// Print pages instead of opening the interactive view
        #[arg(long)]
        plain: bool,

        /// Pages to print in plain mode (0 = until exhausted)
        #[arg(long, default_value = "1")]
        pages: usize,
    },

    /// Show job details
    Show {
        /// Job ID
        id: i64,
    },

    /// Post a job (employers)
    Post {
        /// Job title
        #[arg(long)]
        title: String,

        /// Company name (defaults to your profile's company)
        #[arg(long)]
        company: Option<String>,

        /// Location text, for on-site or hybrid jobs
        #[arg(long)]
        location: Option<String>,

        /// Employment type
        #[arg(short = 't', long = "type", value_enum, default_value = "full-time")]
        job_type: JobType,

        /// Location type
        #[arg(long, value_enum, default_value = "onsite")]
        location_type: LocationType,

        /// Minimum salary
        #[arg(long)]
        salary_min: Option<i64>,

        /// Maximum salary
        #[arg(long)]
        salary_max: Option<i64>,

        /// Description text
        #[arg(short, long, conflicts_with = "description_file")]
        description: Option<String>,

        /// Read the description from a file
        #[arg(long)]
        description_file: Option<PathBuf>,

        /// Requirement (repeatable)
        #[arg(long = "requirement")]
        requirements: Vec<String>,

        /// Benefit (repeatable)
        #[arg(long = "benefit")]
        benefits: Vec<String>,
    },

    /// Apply to a job (job seekers)
    Apply {
        /// Job ID
        job_id: i64,

        /// Resume file to attach
        #[arg(short, long)]
        resume: PathBuf,

        /// Optional cover letter
        #[arg(short, long)]
        cover_letter: Option<String>,
    },

    /// List your posted jobs (employers)
    Dashboard,

    /// List applicants for one of your jobs (employers)
    Applicants {
        /// Job ID
        job_id: i64,
    },

    /// Update an application's status (employers)
    Review {
        /// Application ID
        application_id: i64,

        /// New status
        #[arg(value_enum)]
        status: ApplicationStatus,
    },
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::load()?;

    // The interactive view owns the terminal, so its logs go to a file
    let interactive = matches!(cli.command, Commands::Jobs { plain: false, .. });
    let log_config = LogConfig::from_verbosity(cli.verbose)
        .with_log_file(interactive.then(|| config.log_path()));
    logging::init_logging(&log_config).context("Failed to initialize logging")?;

    let db = Database::open(&config.db_path())?;

    if let Commands::Init = cli.command {
        db.init()?;
        println!("Database initialized at {}", db.path().display());
        return Ok(());
    }
    db.ensure_initialized()?;

    let auth = LocalAuth::open(&config.session_path())?;
    let mut store = SessionStore::init(&auth, &db)?;

    let result = run_command(cli.command, &config, &db, &auth, &mut store);

    store.teardown();
    result
}

fn run_command(
    command: Commands,
    config: &Config,
    db: &Database,
    auth: &LocalAuth,
    store: &mut SessionStore,
) -> Result<()> {
    let viewer = &store.snapshot();
    match command {
        Commands::Init => unreachable!("handled before the session is loaded"),

        Commands::Signup {
            full_name,
            email,
            role,
            company,
        } => {
            let signup = SignupForm {
                full_name,
                email,
                role,
                company_name: company,
            }
            .validate()?;
            if db.get_profile_by_email(&signup.email)?.is_some() {
                return Err(anyhow!("An account for {} already exists", signup.email));
            }
            let id = db.create_profile(
                &signup.full_name,
                &signup.email,
                signup.role,
                signup.company_name.as_deref(),
            )?;
            let profile = db
                .get_profile(id)?
                .ok_or_else(|| anyhow!("Profile #{} vanished after signup", id))?;
            auth.sign_in(&profile)?;
            store.refresh(db)?;
            println!("Created {} account.", profile.role);
            print_session(&store.snapshot());
        }

        Commands::Login { email } => {
            let profile = db
                .get_profile_by_email(email.trim())?
                .ok_or_else(|| anyhow!("No account for {}. Run 'jobboard signup' first.", email))?;
            auth.sign_in(&profile)?;
            store.refresh(db)?;
            print_session(&store.snapshot());
        }

        Commands::Logout => {
            if auth.current().is_none() {
                println!("Not signed in.");
            } else {
                auth.sign_out()?;
                store.refresh(db)?;
                println!("Signed out.");
            }
        }

        Commands::Whoami => print_session(viewer),

        Commands::Jobs {
            search,
            location,
            types,
            remote,
            hybrid,
            page_size,
            plain,
            pages,
        } => {
            let criteria = FilterCriteria::default()
                .with_search(search)
                .with_location(location)
                .with_types(types)
                .with_remote(remote)
                .with_hybrid(hybrid);
            let feed = FeedController::new(criteria, page_size.unwrap_or(config.page_size))?;
            let source = job_source(config)?;
            let driver = FeedDriver::new(Arc::clone(&source));
            info!(
                source = driver.source_name(),
                page_size = feed.page_size(),
                "opening job feed"
            );

            if plain {
                print_pages(feed, driver, pages)?;
            } else {
                tui::run_browse(feed, driver)?;
            }
        }

        Commands::Show { id } => {
            let job = match &config.rest {
                Some(rest) => RestSource::new(rest)?.get_job(id)?,
                None => db.get_job(id)?,
            };
            match job {
                Some(job) => {
                    let applied = match viewer.profile.as_ref() {
                        Some(p) if viewer.is_seeker() => db.has_applied(job.id, p.id)?,
                        _ => false,
                    };
                    let local = config.rest.is_none() || db.get_job(job.id)?.is_some();
                    print_job(&job);
                    println!("\n{}", next_step(&job, viewer, applied, local));
                }
                None => println!("Job #{} not found.", id),
            }
        }

        Commands::Post {
            title,
            company,
            location,
            job_type,
            location_type,
            salary_min,
            salary_max,
            description,
            description_file,
            requirements,
            benefits,
        } => {
            let employer = viewer.require_employer("post jobs")?;
            let description = match (description, description_file) {
                (Some(text), _) => text,
                (None, Some(path)) => std::fs::read_to_string(&path)
                    .with_context(|| format!("Failed to read description file: {}", path.display()))?,
                (None, None) => return Err(anyhow!("Provide --description or --description-file")),
            };
            let job = JobForm {
                title,
                company_name: company,
                location,
                job_type,
                location_type,
                salary_min,
                salary_max,
                description,
                requirements: requirements.join("\n"),
                benefits: benefits.join("\n"),
            }
            .validate(employer.company_name.as_deref())?;
            let id = db.insert_job(&job, employer.id)?;
            info!(job_id = id, employer_id = employer.id, "job posted");
            println!("Posted job #{}: {}", id, job.title);
        }

        Commands::Apply {
            job_id,
            resume,
            cover_letter,
        } => {
            let seeker = viewer.require_seeker("apply to jobs")?;
            job_for_application(db, config.rest.is_some(), job_id)?;
            if db.has_applied(job_id, seeker.id)? {
                return Err(AccessError::AlreadyApplied(job_id).into());
            }
            let stored = store_resume(&config.resume_dir(), job_id, seeker.id, &resume)?;
            let cover_letter = cover_letter.filter(|c| !c.trim().is_empty());
            let id = db.insert_application(
                job_id,
                seeker.id,
                &stored.to_string_lossy(),
                cover_letter.as_deref(),
            )?;
            info!(application_id = id, job_id, "application submitted");
            println!("Applied to job #{} (application #{}).", job_id, id);
        }

        Commands::Dashboard => {
            let employer = viewer.require_employer("access the dashboard")?;
            let jobs = db.list_jobs_for_employer(employer.id)?;
            if jobs.is_empty() {
                println!("You haven't posted any jobs yet.");
            } else {
                println!("{:<6} {:<30} {:<20} {:<12} {:>5}", "ID", "TITLE", "COMPANY", "TYPE", "APPS");
                println!("{}", "-".repeat(77));
                for job in jobs {
                    let apps = db.list_applications(job.id)?.len();
                    println!(
                        "{:<6} {:<30} {:<20} {:<12} {:>5}",
                        job.id,
                        truncate(&job.title, 28),
                        truncate(&job.company_name, 18),
                        job.job_type,
                        apps
                    );
                }
            }
        }

        Commands::Applicants { job_id } => {
            let job = owned_job(db, viewer, job_id, "view applicants")?;
            let applications = db.list_applications(job.id)?;
            println!("Applicants for: {}", job.title);
            if applications.is_empty() {
                println!("\nNo applications yet.");
            } else {
                for app in applications {
                    println!();
                    println!("#{} {} <{}>  [{}]", app.id, app.seeker_name, app.seeker_email, app.status);
                    println!("  Applied: {}", app.applied_at);
                    println!("  Resume:  {}", app.resume_url);
                    if let Some(letter) = &app.cover_letter {
                        for line in textwrap::fill(letter, 72).lines() {
                            println!("  > {}", line);
                        }
                    }
                }
            }
        }

        Commands::Review {
            application_id,
            status,
        } => {
            let app = db
                .get_application(application_id)?
                .ok_or_else(|| anyhow!("Application #{} not found", application_id))?;
            owned_job(db, viewer, app.job_id, "review applications")?;
            db.update_application_status(application_id, status)?;
            println!("Application #{} marked {}.", application_id, status);
        }
    }

    Ok(())
}

fn job_source(config: &Config) -> Result<Arc<dyn JobSource>> {
    match &config.rest {
        Some(rest) => Ok(Arc::new(RestSource::new(rest)?)),
        None => {
            // The feed gets its own connection; fetches run off the main thread
            let db = Database::open(&config.db_path())?;
            Ok(Arc::new(SqliteSource::new(db)))
        }
    }
}

/// The job, if the signed-in employer owns it.
fn owned_job(
    db: &Database,
    viewer: &SessionSnapshot,
    job_id: i64,
    action: &'static str,
) -> Result<JobPosting> {
    let employer = viewer.require_employer(action)?;
    match db.get_job(job_id)? {
        Some(job) if job.employer_id == employer.id => Ok(job),
        _ => Err(AccessError::NotOwner.into()),
    }
}

fn store_resume(dir: &Path, job_id: i64, seeker_id: i64, resume: &Path) -> Result<PathBuf> {
    let file_name = resume
        .file_name()
        .ok_or_else(|| anyhow!("Resume path has no file name: {}", resume.display()))?;
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create {}", dir.display()))?;
    let target = dir.join(format!(
        "{}-{}-{}",
        job_id,
        seeker_id,
        file_name.to_string_lossy()
    ));
    std::fs::copy(resume, &target)
        .with_context(|| format!("Failed to read resume file: {}", resume.display()))?;
    Ok(target)
}

fn print_pages(mut feed: FeedController, mut driver: FeedDriver, pages: usize) -> Result<()> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;

    runtime.block_on(async {
        println!("Jobs: {}", feed.criteria().describe());
        driver.dispatch(feed.mount());
        let mut printed = 0;
        let mut fetched = 0;

        loop {
            driver.settle(&mut feed).await;
            if let Some(err) = feed.error() {
                return Err(anyhow!("{}", err));
            }
            // Nothing left in flight, yet the page never resolved
            if feed.loading() {
                return Err(anyhow!("Page request at offset {} ended without a result", feed.offset()));
            }

            fetched += 1;
            if feed.items().len() > printed {
                println!();
                println!("{:<6} {:<30} {:<20} {:<10} {:<20}", "ID", "TITLE", "COMPANY", "TYPE", "LOCATION");
                println!("{}", "-".repeat(90));
                for job in &feed.items()[printed..] {
                    println!(
                        "{:<6} {:<30} {:<20} {:<10} {:<20}",
                        job.id,
                        truncate(&job.title, 28),
                        truncate(&job.company_name, 18),
                        job.job_type,
                        truncate(job.location_label(), 18)
                    );
                }
                printed = feed.items().len();
            }

            if pages != 0 && fetched >= pages {
                break;
            }
            match feed.load_more() {
                Some(request) => driver.dispatch(Some(request)),
                None => break,
            }
        }

        println!();
        match feed.status() {
            FeedStatus::Empty => println!("No jobs found matching your criteria."),
            _ if feed.has_more() => println!(
                "{} jobs shown. More available: rerun with --pages {}",
                printed,
                fetched + 1
            ),
            _ => println!("{} jobs found. End of results.", printed),
        }
        Ok(())
    })
}

fn print_session(snapshot: &SessionSnapshot) {
    if snapshot.loading {
        println!("Session is still loading.");
        return;
    }
    match (&snapshot.user, &snapshot.profile) {
        (Some(_), Some(profile)) => {
            println!("Signed in as {} <{}>", profile.full_name, profile.email);
            println!("Role: {}", profile.role);
            if let Some(company) = &profile.company_name {
                println!("Company: {}", company);
            }
        }
        (Some(session), None) => {
            println!("Signed in as {}, but the profile no longer exists.", session.email);
        }
        _ => println!("Not signed in."),
    }
}

/// The local copy of a job a seeker wants to apply to. Applications are only
/// stored locally, so jobs seen solely through the REST backend are refused.
fn job_for_application(db: &Database, rest_feed: bool, job_id: i64) -> Result<JobPosting> {
    match db.get_job(job_id)? {
        Some(job) => Ok(job),
        None if rest_feed => Err(anyhow!(
            "Job #{} comes from the REST backend ({}); applications can only be made to jobs in the local store",
            job_id,
            config::ENV_REST_URL
        )),
        None => Err(anyhow!("Job #{} not found", job_id)),
    }
}

/// Closing hint under a job's details.
fn next_step(job: &JobPosting, viewer: &SessionSnapshot, already_applied: bool, local: bool) -> String {
    if already_applied {
        return "You have already applied!".to_string();
    }
    if viewer.is_employer() {
        return match viewer.profile.as_ref() {
            Some(p) if p.id == job.employer_id => {
                format!("Review applicants with: jobboard applicants {}", job.id)
            }
            _ => "Sign in as a job seeker to apply.".to_string(),
        };
    }
    if !local {
        return format!(
            "Listed by the REST backend ({}); applications are only taken for local jobs.",
            config::ENV_REST_URL
        );
    }
    format!("Apply with: jobboard apply {} --resume <file>", job.id)
}

fn print_job(job: &JobPosting) {
    println!("Job #{}", job.id);
    println!("Title: {}", job.title);
    println!("Company: {}", job.company_name);
    println!("Type: {}", job.job_type.label());
    println!("Location: {}", job.location_label());
    println!("Salary: {}", job.salary.display());
    println!("Posted: {}", posted_ago(&job.created_at, Utc::now()));

    println!("\n--- Description ---\n{}", job.description);
    if !job.requirements.is_empty() {
        println!("\n--- Requirements ---");
        for req in &job.requirements {
            println!("  * {}", req);
        }
    }
    if !job.benefits.is_empty() {
        println!("\n--- Benefits ---");
        for benefit in &job.benefits {
            println!("  * {}", benefit);
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn board() -> (Database, SessionSnapshot, SessionSnapshot, i64) {
        let db = Database::open_in_memory().unwrap();
        db.init().unwrap();
        let employer_id = db
            .create_profile("Hana", "hana@corp.eg", Role::Employer, Some("Corp"))
            .unwrap();
        let other_id = db
            .create_profile("Ziad", "ziad@other.eg", Role::Employer, None)
            .unwrap();
        let snapshot = |id| SessionSnapshot {
            user: None,
            profile: db.get_profile(id).unwrap(),
            loading: false,
        };
        let owner = snapshot(employer_id);
        let other = snapshot(other_id);
        let job = JobForm {
            title: "Platform Engineer".into(),
            company_name: None,
            location: None,
            job_type: JobType::FullTime,
            location_type: LocationType::Remote,
            salary_min: None,
            salary_max: None,
            description: "Own the deployment pipeline and the services that power the board.".into(),
            requirements: String::new(),
            benefits: String::new(),
        }
        .validate(Some("Corp"))
        .unwrap();
        let job_id = db.insert_job(&job, employer_id).unwrap();
        (db, owner, other, job_id)
    }

    #[test]
    fn test_owned_job_checks_owner() {
        let (db, owner, other, job_id) = board();
        assert_eq!(owned_job(&db, &owner, job_id, "view applicants").unwrap().id, job_id);

        let err = owned_job(&db, &other, job_id, "view applicants").unwrap_err();
        assert_eq!(err.downcast_ref::<AccessError>(), Some(&AccessError::NotOwner));

        let err = owned_job(&db, &owner, job_id + 1, "view applicants").unwrap_err();
        assert_eq!(err.downcast_ref::<AccessError>(), Some(&AccessError::NotOwner));

        let signed_out = SessionSnapshot::default();
        let err = owned_job(&db, &signed_out, job_id, "view applicants").unwrap_err();
        assert_eq!(err.downcast_ref::<AccessError>(), Some(&AccessError::SignedOut));
    }

    #[test]
    fn test_apply_refuses_jobs_missing_locally() {
        let (db, _, _, job_id) = board();
        assert_eq!(job_for_application(&db, true, job_id).unwrap().id, job_id);

        let err = job_for_application(&db, true, job_id + 50).unwrap_err().to_string();
        assert!(err.contains("REST backend"));
        assert!(err.contains(config::ENV_REST_URL));

        let err = job_for_application(&db, false, job_id + 50).unwrap_err().to_string();
        assert_eq!(err, format!("Job #{} not found", job_id + 50));
    }

    #[test]
    fn test_next_step_hint() {
        let (db, owner, other, job_id) = board();
        let job = db.get_job(job_id).unwrap().unwrap();
        let seeker = SessionSnapshot::default();

        assert_eq!(
            next_step(&job, &seeker, false, true),
            format!("Apply with: jobboard apply {} --resume <file>", job_id)
        );
        // Only on the REST backend: no apply command to suggest
        assert!(!next_step(&job, &seeker, false, false).contains("jobboard apply"));
        assert_eq!(next_step(&job, &seeker, true, true), "You have already applied!");
        assert_eq!(
            next_step(&job, &owner, false, true),
            format!("Review applicants with: jobboard applicants {}", job_id)
        );
        assert_eq!(next_step(&job, &other, false, true), "Sign in as a job seeker to apply.");
    }

    #[test]
    fn test_store_resume_copies_file() {
        let dir = tempfile::tempdir().unwrap();
        let resume = dir.path().join("cv.pdf");
        std::fs::write(&resume, b"%PDF-1.7").unwrap();

        let stored = store_resume(&dir.path().join("resumes"), 4, 9, &resume).unwrap();
        assert_eq!(stored.file_name().unwrap(), "4-9-cv.pdf");
        assert_eq!(std::fs::read(&stored).unwrap(), b"%PDF-1.7");

        let missing = store_resume(&dir.path().join("resumes"), 4, 9, &dir.path().join("nope.pdf"));
        assert!(missing.is_err());
    }

    #[test]
    fn test_cli_parses_feed_filters() {
        let cli = Cli::try_parse_from([
            "jobboard", "jobs", "--search", "rust", "-t", "contract", "-t", "internship", "--remote",
            "--plain", "--pages", "0",
        ])
        .unwrap();
        match cli.command {
            Commands::Jobs { search, types, remote, hybrid, plain, pages, .. } => {
                assert_eq!(search, "rust");
                assert_eq!(types, vec![JobType::Contract, JobType::Internship]);
                assert!(remote && !hybrid && plain);
                assert_eq!(pages, 0);
            }
            _ => panic!("expected jobs command"),
        }

        assert!(Cli::try_parse_from(["jobboard", "jobs", "--page-size", "0"]).is_err());
    }
}
