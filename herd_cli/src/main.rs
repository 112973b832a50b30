use herd_core::*;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "herd")]
#[command(about = "Livestock hormone treatment scheduler", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Override data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Use this Jalali date (YYYY/MM/DD) as today
    #[arg(long, global = true)]
    today: Option<JalaliDate>,

    /// Show debug logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Manage treatment protocol templates
    #[command(subcommand)]
    Protocol(ProtocolCommand),

    /// Assign a protocol to an animal
    Assign {
        /// Animal number
        subject: String,

        /// Protocol id (see `protocol list`)
        protocol_id: String,

        /// Start date (YYYY/MM/DD), defaults to today
        #[arg(long)]
        start: Option<String>,
    },

    /// Mark a scheduled injection as given
    Done {
        subject: String,
        assignment_id: String,

        /// Day offset of the step
        #[arg(allow_hyphen_values = true)]
        day: i32,
    },

    /// Remove an animal and all of its assignments
    RemoveSubject { subject: String },

    /// Show assignments and their progress
    Status {
        /// Only this animal
        subject: Option<String>,
    },

    /// List injections due in the next days
    Upcoming {
        /// Window in days (defaults to config schedule.window_days)
        #[arg(long)]
        days: Option<u32>,

        /// Group by date, then hormone and dosage
        #[arg(long)]
        by_date: bool,
    },

    /// Convert dates between calendars
    #[command(subcommand)]
    Convert(ConvertCommand),
}

#[derive(Subcommand)]
enum ProtocolCommand {
    /// Create an empty protocol
    Create { name: String },

    /// Add a step to a protocol
    AddStep {
        id: String,

        /// Days after the start date
        #[arg(long, allow_hyphen_values = true)]
        day: i32,

        #[arg(long)]
        hormone: String,

        #[arg(long)]
        dosage: String,

        #[arg(long)]
        note: Option<String>,
    },

    /// Remove the step at a day offset
    RemoveStep {
        id: String,

        #[arg(long, allow_hyphen_values = true)]
        day: i32,
    },

    /// Delete a protocol (existing assignments are kept)
    Delete { id: String },

    /// List protocols and their steps
    List,
}

#[derive(Subcommand)]
enum ConvertCommand {
    /// Gregorian YYYY-MM-DD to Jalali
    ToJalali { date: String },

    /// Jalali YYYY/MM/DD to Gregorian
    ToGregorian { date: String },
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose {
        herd_core::logging::init_with_level("debug");
    } else {
        herd_core::logging::init();
    }

    let config = Config::load()?;
    let state_path = match cli.data_dir {
        Some(dir) => dir.join(herd_core::config::STATE_FILE_NAME),
        None => config.data.state_path(),
    };
    let clock: Box<dyn Clock> = match cli.today {
        Some(date) => Box::new(FixedClock(date)),
        None => Box::new(SystemClock),
    };
    tracing::debug!("Using state file {:?}", state_path);

    let ctx = Context {
        state_path,
        clock,
        config,
    };

    match cli.command {
        Commands::Protocol(cmd) => cmd_protocol(&ctx, cmd),
        Commands::Assign {
            subject,
            protocol_id,
            start,
        } => cmd_assign(&ctx, &subject, &protocol_id, start),
        Commands::Done {
            subject,
            assignment_id,
            day,
        } => cmd_done(&ctx, &subject, &assignment_id, day),
        Commands::RemoveSubject { subject } => cmd_remove_subject(&ctx, &subject),
        Commands::Status { subject } => cmd_status(&ctx, subject),
        Commands::Upcoming { days, by_date } => cmd_upcoming(&ctx, days, by_date),
        Commands::Convert(cmd) => cmd_convert(cmd),
    }
}

struct Context {
    state_path: PathBuf,
    clock: Box<dyn Clock>,
    config: Config,
}

impl Context {
    fn update<T>(&self, f: impl FnOnce(&mut HerdState) -> Result<T>) -> Result<T> {
        HerdState::update(&self.state_path, self.clock.as_ref(), f)
    }

    fn load(&self) -> Result<HerdState> {
        HerdState::load(&self.state_path)
    }
}

fn cmd_protocol(ctx: &Context, cmd: ProtocolCommand) -> Result<()> {
    match cmd {
        ProtocolCommand::Create { name } => {
            let id = ctx.update(|state| state.protocols.create(&name))?;
            println!("✓ Created protocol \"{}\" with id {}", name.trim(), id);
        }
        ProtocolCommand::AddStep {
            id,
            day,
            hormone,
            dosage,
            note,
        } => {
            let id = ProtocolId::from(id);
            let step = ctx.update(|state| {
                state
                    .protocols
                    .add_step(&id, day, &hormone, &dosage, note.as_deref())
            })?;
            println!(
                "✓ Added day {}: {} {} to {}",
                step.day_offset, step.hormone_name, step.dosage, id
            );
        }
        ProtocolCommand::RemoveStep { id, day } => {
            let id = ProtocolId::from(id);
            match ctx.update(|state| state.protocols.remove_step(&id, day))? {
                Some(step) => println!("✓ Removed day {} ({})", day, step.hormone_name),
                None => println!("No step on day {} in {}", day, id),
            }
        }
        ProtocolCommand::Delete { id } => {
            let id = ProtocolId::from(id);
            let removed = ctx.update(|state| state.protocols.delete(&id))?;
            println!(
                "✓ Deleted protocol \"{}\" (existing assignments kept)",
                removed.name
            );
        }
        ProtocolCommand::List => {
            let state = ctx.load()?;
            if state.protocols.is_empty() {
                println!("No protocols defined.");
            }
            for protocol in state.protocols.list() {
                println!("{}  {}", protocol.id, protocol.summary());
                for step in &protocol.steps {
                    print!(
                        "    day {:>3}  {} {}",
                        step.day_offset, step.hormone_name, step.dosage
                    );
                    if !step.note.is_empty() {
                        print!("  ({})", step.note);
                    }
                    println!();
                }
            }
        }
    }
    Ok(())
}

fn cmd_assign(
    ctx: &Context,
    subject: &str,
    protocol_id: &str,
    start: Option<String>,
) -> Result<()> {
    let start = match start {
        Some(start) => start,
        None => ctx.clock.today()?.to_string(),
    };
    let protocol_id = ProtocolId::from(protocol_id);
    let assignment = ctx.update(|state| {
        state
            .cattle_protocols
            .assign(subject, &state.protocols, &protocol_id, &start)
    })?;

    println!(
        "✓ Assigned \"{}\" to {} as {}",
        assignment.protocol_name, assignment.subject_id, assignment.id
    );
    for step in &assignment.steps {
        println!(
            "    {}  day {:>3}  {} {}",
            step.injection_date, step.day_offset, step.hormone_name, step.dosage
        );
    }
    Ok(())
}

fn cmd_done(ctx: &Context, subject: &str, assignment_id: &str, day: i32) -> Result<()> {
    let subject = SubjectId::from(subject);
    let assignment_id = AssignmentId::from(assignment_id);
    let changed = ctx.update(|state| {
        state
            .cattle_protocols
            .mark_step_done(&subject, &assignment_id, day)
    })?;

    if changed {
        println!("✓ Day {} of {} marked done for {}", day, assignment_id, subject);
    } else {
        println!("Day {} of {} was already done", day, assignment_id);
    }
    Ok(())
}

fn cmd_remove_subject(ctx: &Context, subject: &str) -> Result<()> {
    let subject = SubjectId::from(subject);
    let removed = ctx.update(|state| Ok(state.cattle_protocols.remove_subject(&subject)))?;
    println!("✓ Removed {} with {} assignments", subject, removed.len());
    Ok(())
}

fn cmd_status(ctx: &Context, subject: Option<String>) -> Result<()> {
    let state = ctx.load()?;
    let today = ctx.clock.today()?;

    if subject.is_none() {
        let due = due_today(&state.cattle_protocols, &today);
        println!("Today: {}", today);
        println!(
            "Protocols: {}  Animals under treatment: {}  Due today: {}",
            state.protocols.len(),
            state.cattle_protocols.active_subject_count(),
            due.len()
        );
        for group in group_by_hormone_dosage(due) {
            print_hormone_group(&group);
        }
        println!();
    }

    let assignments: Vec<&Assignment> = match &subject {
        Some(subject) => state
            .cattle_protocols
            .assignments_for(&SubjectId::from(subject.as_str()))
            .iter()
            .collect(),
        None => state.cattle_protocols.iter().collect(),
    };

    if assignments.is_empty() {
        println!("No assignments.");
        return Ok(());
    }

    for assignment in assignments {
        let finished = if assignment.is_complete() { "  complete" } else { "" };
        println!(
            "{}  {}  \"{}\"  from {}  {}%{}",
            assignment.subject_id,
            assignment.id,
            assignment.protocol_name,
            assignment.start_date,
            assignment.progress(),
            finished
        );
        for step in &assignment.steps {
            let mark = if step.done { "✓" } else { "·" };
            println!(
                "    {} {}  day {:>3}  {} {}",
                mark, step.injection_date, step.day_offset, step.hormone_name, step.dosage
            );
        }
    }
    Ok(())
}

fn cmd_upcoming(ctx: &Context, days: Option<u32>, by_date: bool) -> Result<()> {
    let state = ctx.load()?;
    let today = ctx.clock.today()?;
    let window = days.unwrap_or(ctx.config.schedule.window_days);
    let due = upcoming_injections(&state.cattle_protocols, window, &today);

    if due.is_empty() {
        println!("No injections due in the next {} days.", window);
        return Ok(());
    }

    if by_date {
        // today's injections are listed by `status`
        let ahead = due.into_iter().filter(|item| item.days_from_now > 0);
        for day in group_by_date_then_hormone(ahead) {
            println!("{}  ({})", day.date, relative_day(day.days_from_now));
            for group in &day.groups {
                print_hormone_group(group);
            }
        }
    } else {
        for item in &due {
            println!(
                "{}  {:<9}  {}  {} {}  \"{}\" day {}  {}",
                item.injection_date,
                relative_day(item.days_from_now),
                item.subject_id,
                item.hormone_name,
                item.dosage,
                item.protocol_name,
                item.day_offset,
                item.assignment_id
            );
        }
    }
    Ok(())
}

fn cmd_convert(cmd: ConvertCommand) -> Result<()> {
    match cmd {
        ConvertCommand::ToJalali { date } => {
            let parsed = chrono::NaiveDate::parse_from_str(date.trim(), "%Y-%m-%d")
                .map_err(|e| Error::InvalidDate(format!("{:?}: {}", date, e)))?;
            println!("{}", JalaliDate::from_naive_date(parsed)?);
        }
        ConvertCommand::ToGregorian { date } => {
            let gregorian = calendar::parse(&date)?.to_naive_date()?;
            println!("{}", gregorian.format("%Y-%m-%d"));
        }
    }
    Ok(())
}

fn print_hormone_group(group: &HormoneGroup) {
    let subjects: Vec<&str> = group.items.iter().map(|d| d.subject_id.as_str()).collect();
    println!(
        "    {} {}  x{}  [{}]",
        group.hormone_name,
        group.dosage,
        group.items.len(),
        subjects.join(", ")
    );
}

fn relative_day(days_from_now: i64) -> String {
    match days_from_now {
        0 => "today".to_string(),
        1 => "tomorrow".to_string(),
        n => format!("in {} days", n),
    }
}
