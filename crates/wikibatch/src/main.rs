use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use clap::{Args, CommandFactory, Parser, Subcommand, ValueEnum};
use tracing_subscriber::EnvFilter;
use wikibatch_core::api::{MediaWikiClient, MediaWikiClientConfig, WikiWriteApi};
use wikibatch_core::batch::{BatchOptions, BatchReport, ItemStatus};
use wikibatch_core::config::{BatchConfig, credentials_from_env, load_config};
use wikibatch_core::input::{CsvColumn, TargetSource, load_csv_pairs};
use wikibatch_core::jobs::{
    DEFAULT_DELETE_REASON, DEFAULT_FIX_FILE_ILLS_SUMMARY, DEFAULT_MOVE_REASON,
    DEFAULT_REDIRECT_SUMMARY, DEFAULT_REMOVE_TEMPLATE_SUMMARY, FILE_ILLS_CATEGORY,
    FILE_ILLS_NAMESPACE, IllSettings, LANGUAGE_ROW_HEADERS, UNKNOWN_ILLS_HEADERS, add_category,
    add_interwiki, create_redirects, default_add_category_summary, default_add_interwiki_summary,
    default_remove_category_summary, default_remove_interwiki_summary, delete_pages,
    fix_file_ills, language_rows, move_pages, parse_invocation, remove_category,
    remove_interwiki, remove_template, scan_ill_languages, scan_unknown_ills, write_csv_report,
    write_json_report,
};
use wikibatch_core::runtime::{
    InitOptions, PathOverrides, ResolutionContext, ResolvedPaths, init_layout, resolve_paths,
};

#[derive(Debug, Parser)]
#[command(
    name = "wikibatch",
    version,
    about = "Batch maintenance for MediaWiki pages: {{ill}} rewrites, category edits, deletes, redirects and moves"
)]
struct Cli {
    #[arg(long, global = true, value_name = "PATH")]
    project_root: Option<PathBuf>,
    #[arg(long, global = true, value_name = "PATH")]
    config: Option<PathBuf>,
    #[arg(long, global = true, help = "Print resolved runtime diagnostics")]
    diagnostics: bool,
    #[arg(short, long, global = true, action = clap::ArgAction::Count, help = "Increase log verbosity (-v debug, -vv trace)")]
    verbose: u8,
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Debug, Clone)]
struct RuntimeOptions {
    project_root: Option<PathBuf>,
    config: Option<PathBuf>,
    diagnostics: bool,
}

impl RuntimeOptions {
    fn from_cli(cli: &Cli) -> Self {
        Self {
            project_root: cli.project_root.clone(),
            config: cli.config.clone(),
            diagnostics: cli.diagnostics,
        }
    }
}

#[derive(Debug, Subcommand)]
enum Commands {
    #[command(about = "Create .wikibatch/ and a default config.toml")]
    Init(InitArgs),
    #[command(about = "Parse one template invocation offline and print it as JSON")]
    Parse(ParseArgs),
    #[command(about = "Rewrite {{ill|File:...}} into [[File:...|thumb]]")]
    FixFileIlls(EditArgs),
    #[command(about = "Remove every invocation of the given templates")]
    RemoveTemplate(RemoveTemplateArgs),
    #[command(about = "List templates carrying the unknown marker as CSV")]
    UnknownIlls(UnknownIllsArgs),
    #[command(about = "Report language/title pairs found in {{ill}} templates")]
    IllLanguages(IllLanguagesArgs),
    #[command(about = "Append a category link to each page")]
    AddCategory(CategoryArgs),
    #[command(about = "Remove a category link from each page")]
    RemoveCategory(CategoryArgs),
    #[command(about = "Remove interlanguage links for one language from each page")]
    RemoveInterwiki(InterwikiArgs),
    #[command(about = "Add interlanguage links from a page,foreign-title CSV")]
    AddInterwiki(AddInterwikiArgs),
    #[command(about = "Delete pages")]
    Delete(EditArgs),
    #[command(about = "Create redirects from a source,target CSV")]
    Redirect(PairArgs),
    #[command(about = "Move pages listed in a from,to CSV")]
    Move(PairArgs),
}

#[derive(Debug, Args)]
struct InitArgs {
    #[arg(long, help = "Overwrite an existing config.toml")]
    force: bool,
}

#[derive(Debug, Args)]
struct ParseArgs {
    #[arg(value_name = "WIKITEXT", help = "A single invocation, e.g. '{{ill|Foo|ja|Bar}}'")]
    template: String,
}

#[derive(Debug, Args)]
#[group(required = false, multiple = false)]
struct SourceArgs {
    #[arg(long, value_name = "NAME", help = "Pages in this category")]
    category: Option<String>,
    #[arg(long, value_name = "PATH", help = "Text file with one title per line")]
    titles: Option<PathBuf>,
    #[arg(long, value_name = "PATH", help = "CSV file; see --column")]
    csv: Option<PathBuf>,
    #[arg(long, value_name = "PATH", help = "MediaWiki XML export")]
    xml: Option<PathBuf>,
    #[arg(long = "page", value_name = "TITLE", help = "Explicit title (repeatable)")]
    pages: Vec<String>,
}

#[derive(Debug, Args)]
struct TargetArgs {
    #[command(flatten)]
    source: SourceArgs,
    #[arg(long, value_name = "NAME|INDEX", default_value = "0", help = "CSV column holding titles")]
    column: String,
    #[arg(long, value_name = "ID", help = "Namespace filter for --category (default from config)")]
    namespace: Option<i32>,
    #[arg(long, conflicts_with = "namespace", help = "List --category members in every namespace")]
    all_namespaces: bool,
    #[arg(long, value_name = "N", help = "Process at most N pages")]
    limit: Option<usize>,
}

impl TargetArgs {
    fn source(&self, default_category: Option<&str>) -> Result<TargetSource> {
        let source = &self.source;
        if let Some(category) = &source.category {
            return Ok(TargetSource::Category(category.clone()));
        }
        if let Some(path) = &source.titles {
            return Ok(TargetSource::TitleFile(path.clone()));
        }
        if let Some(path) = &source.csv {
            return Ok(TargetSource::Csv {
                path: path.clone(),
                column: CsvColumn::parse(&self.column),
            });
        }
        if let Some(path) = &source.xml {
            return Ok(TargetSource::Xml(path.clone()));
        }
        if !source.pages.is_empty() {
            return Ok(TargetSource::Titles(source.pages.clone()));
        }
        match default_category {
            Some(category) => Ok(TargetSource::Category(category.to_string())),
            None => bail!("no target pages given; use --category, --titles, --csv, --xml or --page"),
        }
    }
}

#[derive(Debug, Args)]
struct WriteArgs {
    #[arg(long, help = "Plan and report without saving anything")]
    dry_run: bool,
    #[arg(long, visible_alias = "reason", value_name = "TEXT", help = "Edit summary or log reason")]
    summary: Option<String>,
    #[arg(long, help = "Print a unified diff for each changed page")]
    diff: bool,
    #[arg(long, value_name = "PATH", help = "Also write the batch report as JSON")]
    report: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct EditArgs {
    #[command(flatten)]
    target: TargetArgs,
    #[command(flatten)]
    write: WriteArgs,
}

#[derive(Debug, Args)]
struct RemoveTemplateArgs {
    #[arg(long = "template", value_name = "NAME", required = true, help = "Template name (repeatable)")]
    templates: Vec<String>,
    #[command(flatten)]
    edit: EditArgs,
}

#[derive(Debug, Args)]
struct CategoryArgs {
    #[arg(value_name = "CATEGORY")]
    name: String,
    #[command(flatten)]
    edit: EditArgs,
}

#[derive(Debug, Args)]
struct InterwikiArgs {
    #[arg(long = "lang", value_name = "CODE", help = "Language prefix, e.g. sn")]
    language: String,
    #[command(flatten)]
    edit: EditArgs,
}

#[derive(Debug, Args)]
struct AddInterwikiArgs {
    #[arg(long = "lang", value_name = "CODE", help = "Language prefix, e.g. en")]
    language: String,
    #[command(flatten)]
    pairs: PairArgs,
}

#[derive(Debug, Args)]
struct PairArgs {
    #[arg(value_name = "CSV", help = "Two-column CSV with a header row")]
    csv: PathBuf,
    #[arg(long, value_name = "N", help = "Process at most N rows")]
    limit: Option<usize>,
    #[command(flatten)]
    write: WriteArgs,
}

#[derive(Debug, Args)]
struct UnknownIllsArgs {
    #[command(flatten)]
    target: TargetArgs,
    #[arg(long, value_name = "PATH", help = "CSV output (default: .wikibatch/reports/unknown_ills.csv)")]
    output: Option<PathBuf>,
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ReportFormat {
    Json,
    Csv,
}

#[derive(Debug, Args)]
struct IllLanguagesArgs {
    #[command(flatten)]
    target: TargetArgs,
    #[arg(long, value_enum, default_value = "json")]
    format: ReportFormat,
    #[arg(long, value_name = "PATH", help = "Output file (default: .wikibatch/reports/ill_languages.<format>)")]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);
    let runtime = RuntimeOptions::from_cli(&cli);

    match cli.command {
        Some(Commands::Init(args)) => run_init(&runtime, args),
        Some(Commands::Parse(args)) => run_parse(&runtime, args),
        Some(Commands::FixFileIlls(args)) => run_fix_file_ills(&runtime, args),
        Some(Commands::RemoveTemplate(args)) => run_remove_template(&runtime, args),
        Some(Commands::UnknownIlls(args)) => run_unknown_ills(&runtime, args),
        Some(Commands::IllLanguages(args)) => run_ill_languages(&runtime, args),
        Some(Commands::AddCategory(args)) => run_category(&runtime, args, true),
        Some(Commands::RemoveCategory(args)) => run_category(&runtime, args, false),
        Some(Commands::RemoveInterwiki(args)) => run_remove_interwiki(&runtime, args),
        Some(Commands::AddInterwiki(args)) => run_pairs(
            &runtime,
            args.pairs,
            PairJob::AddInterwiki {
                language: &args.language,
            },
        ),
        Some(Commands::Delete(args)) => run_delete(&runtime, args),
        Some(Commands::Redirect(args)) => run_pairs(&runtime, args, PairJob::Redirect),
        Some(Commands::Move(args)) => run_pairs(&runtime, args, PairJob::Move),
        None => {
            let mut command = Cli::command();
            command.print_help()?;
            println!();
            Ok(())
        }
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn run_init(runtime: &RuntimeOptions, args: InitArgs) -> Result<()> {
    let paths = resolve_runtime_paths(runtime)?;
    let report = init_layout(&paths, &InitOptions { force: args.force })?;

    println!("Initialized wikibatch runtime layout");
    println!("project_root: {}", normalize_path(&paths.project_root));
    println!("state_dir: {}", normalize_path(&paths.state_dir));
    println!("reports_dir: {}", normalize_path(&paths.reports_dir));
    println!("config_path: {}", normalize_path(&paths.config_path));
    println!("created_dirs: {}", report.created_dirs.len());
    println!("wrote_config: {}", format_flag(report.wrote_config));
    if runtime.diagnostics {
        println!("\n[diagnostics]\n{}", paths.diagnostics());
    }
    Ok(())
}

fn run_parse(runtime: &RuntimeOptions, args: ParseArgs) -> Result<()> {
    let (_, config) = load_runtime(runtime)?;
    let report = parse_invocation(&args.template, &IllSettings::from_config(&config))?;
    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(())
}

fn run_fix_file_ills(runtime: &RuntimeOptions, args: EditArgs) -> Result<()> {
    let mut session = Session::open(runtime)?;
    let settings = IllSettings::from_config(&session.config);
    let titles = session.resolve_targets(
        &args.target,
        Some(FILE_ILLS_CATEGORY),
        Some(FILE_ILLS_NAMESPACE),
    )?;
    session.authenticate(args.write.dry_run)?;
    let summary = summary_or(&args.write, DEFAULT_FIX_FILE_ILLS_SUMMARY);
    let options = session.batch_options(&args.target, &args.write);
    let report = fix_file_ills(&mut session.client, &titles, &settings, &summary, &options);
    session.finish(&report, &args.write)
}

fn run_remove_template(runtime: &RuntimeOptions, args: RemoveTemplateArgs) -> Result<()> {
    let mut session = Session::open(runtime)?;
    let edit = &args.edit;
    let titles = session.resolve_targets(&edit.target, None, None)?;
    session.authenticate(edit.write.dry_run)?;
    let summary = summary_or(&edit.write, DEFAULT_REMOVE_TEMPLATE_SUMMARY);
    let options = session.batch_options(&edit.target, &edit.write);
    let report = remove_template(
        &mut session.client,
        &titles,
        &args.templates,
        &summary,
        &options,
    );
    session.finish(&report, &edit.write)
}

fn run_category(runtime: &RuntimeOptions, args: CategoryArgs, add: bool) -> Result<()> {
    let mut session = Session::open(runtime)?;
    let edit = &args.edit;
    let titles = session.resolve_targets(&edit.target, None, None)?;
    session.authenticate(edit.write.dry_run)?;
    let options = session.batch_options(&edit.target, &edit.write);
    let report = if add {
        let summary = summary_or(&edit.write, &default_add_category_summary(&args.name));
        add_category(&mut session.client, &titles, &args.name, &summary, &options)
    } else {
        let summary = summary_or(&edit.write, &default_remove_category_summary(&args.name));
        remove_category(&mut session.client, &titles, &args.name, &summary, &options)
    };
    session.finish(&report, &edit.write)
}

fn run_remove_interwiki(runtime: &RuntimeOptions, args: InterwikiArgs) -> Result<()> {
    let mut session = Session::open(runtime)?;
    let edit = &args.edit;
    let titles = session.resolve_targets(&edit.target, None, None)?;
    session.authenticate(edit.write.dry_run)?;
    let summary = summary_or(&edit.write, &default_remove_interwiki_summary(&args.language));
    let options = session.batch_options(&edit.target, &edit.write);
    let report = remove_interwiki(&mut session.client, &titles, &args.language, &summary, &options);
    session.finish(&report, &edit.write)
}

fn run_delete(runtime: &RuntimeOptions, args: EditArgs) -> Result<()> {
    let mut session = Session::open(runtime)?;
    let titles = session.resolve_targets(&args.target, None, None)?;
    session.authenticate(args.write.dry_run)?;
    let reason = summary_or(&args.write, DEFAULT_DELETE_REASON);
    let options = session.batch_options(&args.target, &args.write);
    let report = delete_pages(&mut session.client, &titles, &reason, &options);
    session.finish(&report, &args.write)
}

#[derive(Debug, Clone, Copy)]
enum PairJob<'a> {
    Redirect,
    Move,
    AddInterwiki { language: &'a str },
}

fn run_pairs(runtime: &RuntimeOptions, args: PairArgs, job: PairJob<'_>) -> Result<()> {
    let mut session = Session::open(runtime)?;
    let pairs = load_csv_pairs(&args.csv)?;
    println!("rows: {}", pairs.len());
    session.authenticate(args.write.dry_run)?;
    let options = BatchOptions {
        dry_run: args.write.dry_run,
        rate_limit_cooldown: session.config.rate_limit_cooldown(),
        limit: args.limit,
        show_diff: args.write.diff,
    };
    let report = match job {
        PairJob::Redirect => {
            let summary = summary_or(&args.write, DEFAULT_REDIRECT_SUMMARY);
            create_redirects(&mut session.client, &pairs, &summary, &options)
        }
        PairJob::Move => {
            let reason = summary_or(&args.write, DEFAULT_MOVE_REASON);
            move_pages(&mut session.client, &pairs, &reason, &options)
        }
        PairJob::AddInterwiki { language } => {
            let summary = summary_or(&args.write, &default_add_interwiki_summary(language));
            add_interwiki(&mut session.client, &pairs, language, &summary, &options)
        }
    };
    session.finish(&report, &args.write)
}

fn run_unknown_ills(runtime: &RuntimeOptions, args: UnknownIllsArgs) -> Result<()> {
    let mut session = Session::open(runtime)?;
    let settings = IllSettings::from_config(&session.config);
    let titles = session.resolve_targets(&args.target, None, None)?;
    let options = session.scan_options(&args.target);
    let (report, rows) = scan_unknown_ills(&mut session.client, &titles, &settings, &options);

    let output = session.report_path(args.output.as_deref(), "unknown_ills.csv")?;
    write_csv_report(&output, &UNKNOWN_ILLS_HEADERS, &rows)?;
    print_report(&report, false);
    println!("rows: {}", rows.len());
    println!("output: {}", normalize_path(&output));
    finish_report(&report)
}

fn run_ill_languages(runtime: &RuntimeOptions, args: IllLanguagesArgs) -> Result<()> {
    let mut session = Session::open(runtime)?;
    let settings = IllSettings::from_config(&session.config);
    let titles = session.resolve_targets(&args.target, None, None)?;
    let options = session.scan_options(&args.target);
    let (report, pages) = scan_ill_languages(&mut session.client, &titles, &settings, &options);

    let default_name = match args.format {
        ReportFormat::Json => "ill_languages.json",
        ReportFormat::Csv => "ill_languages.csv",
    };
    let output = session.report_path(args.output.as_deref(), default_name)?;
    match args.format {
        ReportFormat::Json => write_json_report(&output, &pages)?,
        ReportFormat::Csv => write_csv_report(&output, &LANGUAGE_ROW_HEADERS, &language_rows(&pages))?,
    }
    print_report(&report, false);
    println!("pages_with_templates: {}", pages.len());
    println!("output: {}", normalize_path(&output));
    finish_report(&report)
}

/// Resolved paths, loaded config and the one client used for a command.
struct Session {
    paths: ResolvedPaths,
    config: BatchConfig,
    client: MediaWikiClient,
    diagnostics: bool,
}

impl Session {
    fn open(runtime: &RuntimeOptions) -> Result<Self> {
        let (paths, config) = load_runtime(runtime)?;
        let client = MediaWikiClient::new(MediaWikiClientConfig::from_config(&config))?;
        tracing::debug!(api_url = %client.config().api_url, "opened MediaWiki client");
        Ok(Self {
            paths,
            config,
            client,
            diagnostics: runtime.diagnostics,
        })
    }

    fn resolve_targets(
        &mut self,
        target: &TargetArgs,
        default_category: Option<&str>,
        default_namespace: Option<i32>,
    ) -> Result<Vec<String>> {
        let source = target.source(default_category)?;
        let namespace = self.config.category_namespace(
            target.namespace,
            target.all_namespaces,
            default_namespace,
        );
        let titles = source.resolve(&mut self.client, namespace)?;
        println!("source: {}", source.describe());
        println!("targets: {}", titles.len());
        Ok(titles)
    }

    /// Writes need a bot login; a dry run logs in only when credentials exist.
    fn authenticate(&mut self, dry_run: bool) -> Result<()> {
        match credentials_from_env() {
            Some((username, password)) => self
                .client
                .login(&username, &password)
                .context("failed to log in with WIKI_BOT_USER / WIKI_BOT_PASS"),
            None if dry_run => {
                tracing::info!("no bot credentials set; dry run continues anonymously");
                Ok(())
            }
            None => bail!("WIKI_BOT_USER and WIKI_BOT_PASS must be set for write commands"),
        }
    }

    fn batch_options(&self, target: &TargetArgs, write: &WriteArgs) -> BatchOptions {
        BatchOptions {
            dry_run: write.dry_run,
            rate_limit_cooldown: self.config.rate_limit_cooldown(),
            limit: target.limit,
            show_diff: write.diff,
        }
    }

    fn scan_options(&self, target: &TargetArgs) -> BatchOptions {
        BatchOptions {
            dry_run: false,
            rate_limit_cooldown: self.config.rate_limit_cooldown(),
            limit: target.limit,
            show_diff: false,
        }
    }

    fn report_path(&self, explicit: Option<&Path>, default_name: &str) -> Result<PathBuf> {
        let cwd = ResolutionContext::from_process()?.cwd;
        Ok(self.paths.report_path(explicit, &cwd, default_name))
    }

    fn finish(&self, report: &BatchReport, write: &WriteArgs) -> Result<()> {
        print_report(report, write.diff);
        if let Some(path) = &write.report {
            write_json_report(path, report)?;
            println!("report: {}", normalize_path(path));
        }
        if self.diagnostics {
            println!("\n[diagnostics]\n{}", self.paths.diagnostics());
        }
        finish_report(report)
    }
}

fn load_runtime(runtime: &RuntimeOptions) -> Result<(ResolvedPaths, BatchConfig)> {
    let paths = resolve_runtime_paths(runtime)?;
    let config = load_config(&paths.config_path)?;
    Ok((paths, config))
}

fn summary_or(write: &WriteArgs, default: &str) -> String {
    write
        .summary
        .as_deref()
        .map(str::trim)
        .filter(|summary| !summary.is_empty())
        .unwrap_or(default)
        .to_string()
}

fn print_report(report: &BatchReport, show_diff: bool) {
    println!("{}", report.action);
    println!("dry_run: {}", format_flag(report.dry_run));
    println!("processed: {}", report.processed);
    if report.scanned > 0 {
        println!("scanned: {}", report.scanned);
    } else if report.dry_run {
        println!("would_update: {}", report.updated);
    } else {
        println!("updated: {}", report.updated);
    }
    println!("unchanged: {}", report.unchanged);
    println!("skipped: {}", report.skipped);
    println!("failed: {}", report.failed);
    println!("rate_limited: {}", report.rate_limited);
    println!("cooldowns: {}", report.cooldowns);
    println!("unclassified: {}", report.unclassified);
    println!("request_count: {}", report.request_count);

    for status in [ItemStatus::Failed, ItemStatus::RateLimited] {
        let items = report.items_with_status(status).collect::<Vec<_>>();
        if items.is_empty() {
            continue;
        }
        println!("{}:", status.as_str());
        for item in items {
            println!(
                "  - {}: {}",
                item.title,
                item.detail.as_deref().unwrap_or("no detail")
            );
        }
    }

    let review = report
        .items
        .iter()
        .flat_map(|item| item.unclassified.iter().map(move |entry| (item, entry)))
        .collect::<Vec<_>>();
    if !review.is_empty() {
        println!("needs_review:");
        for (item, entry) in review {
            println!("  - {} ({}): {}", item.title, entry.reason, entry.text);
        }
    }

    if show_diff {
        for item in &report.items {
            if let Some(diff) = &item.diff {
                println!("\n{diff}");
            }
        }
    }
}

fn finish_report(report: &BatchReport) -> Result<()> {
    if report.has_failures() {
        bail!(
            "{} finished with {} failed and {} rate-limited page(s)",
            report.action,
            report.failed,
            report.rate_limited
        );
    }
    Ok(())
}

fn resolve_runtime_paths(runtime: &RuntimeOptions) -> Result<ResolvedPaths> {
    dotenvy::dotenv().ok();

    let context = ResolutionContext::from_process()?;
    let overrides = PathOverrides {
        project_root: runtime.project_root.clone(),
        config: runtime.config.clone(),
    };

    let initial = resolve_paths(&context, &overrides)?;
    let project_env = initial.project_root.join(".env");
    if project_env.exists() {
        let _ = dotenvy::from_path_override(&project_env);
    }

    resolve_paths(&context, &overrides)
}

fn normalize_path(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

fn format_flag(value: bool) -> &'static str {
    if value { "yes" } else { "no" }
}
