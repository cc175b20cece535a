//! CLI command implementations

use crate::client::ApiClient;
use anyhow::{Context, Result};
use civic_core::issue::SUGGESTED_CATEGORIES;
use civic_core::{
    Config, Coordinates, ExternalIssue, IssueStats, LifecycleService, ListParams, ListingConfig,
    Location, MigrationReport, NewIssue, Status, Store,
};
use colored::{ColoredString, Colorize};
use std::path::Path;
use tabled::settings::Style;
use tabled::{Table, Tabled};

/// Fields for a new issue as given on the command line
pub struct CreateArgs {
    pub title: String,
    pub description: String,
    pub address: String,
    pub ward: Option<String>,
    pub category: Option<String>,
    pub priority: Option<String>,
    pub coordinates: Option<(f64, f64)>,
    pub photos: Vec<String>,
}

impl CreateArgs {
    fn into_request(self) -> NewIssue {
        let location = Location {
            address: Some(self.address),
            ward: self.ward,
            coordinates: self
                .coordinates
                .map(|(latitude, longitude)| Coordinates {
                    latitude,
                    longitude,
                }),
        };
        NewIssue {
            title: Some(self.title),
            description: Some(self.description),
            category: self.category,
            priority: self.priority,
            location: Some(location),
            photos: (!self.photos.is_empty()).then_some(self.photos),
        }
    }
}

#[derive(Tabled)]
struct IssueRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Status")]
    status: String,
    #[tabled(rename = "Priority")]
    priority: String,
    #[tabled(rename = "Category")]
    category: String,
    #[tabled(rename = "Title")]
    title: String,
    #[tabled(rename = "Reported")]
    date: String,
}

impl From<&ExternalIssue> for IssueRow {
    fn from(issue: &ExternalIssue) -> Self {
        Self {
            id: issue.id.clone(),
            status: issue.status.to_string(),
            priority: issue.priority.to_string(),
            category: issue.category.clone(),
            title: issue.title.clone(),
            date: issue.date.clone(),
        }
    }
}

#[derive(Tabled)]
struct CountRow {
    #[tabled(rename = "Value")]
    value: String,
    #[tabled(rename = "Issues")]
    count: usize,
}

fn is_suggested_category(category: &str) -> bool {
    SUGGESTED_CATEGORIES
        .iter()
        .any(|c| c.eq_ignore_ascii_case(category.trim()))
}

fn status_label(status: Status) -> ColoredString {
    let label = status.to_string();
    match status {
        Status::Pending => label.yellow(),
        Status::InProgress => label.blue(),
        Status::Resolved => label.green(),
    }
}

pub fn render_issue_table(issues: &[ExternalIssue]) -> String {
    let rows: Vec<IssueRow> = issues.iter().map(IssueRow::from).collect();
    Table::new(rows).with(Style::rounded()).to_string()
}

pub fn render_stats(stats: &IssueStats) -> String {
    let mut out = String::new();
    out.push_str(&format!("Total issues:     {}\n", stats.total_issues));
    out.push_str(&format!("Pending:          {}\n", stats.pending_issues));
    out.push_str(&format!("In Progress:      {}\n", stats.in_progress_issues));
    out.push_str(&format!("Resolved:         {}\n", stats.resolved_issues));
    out.push_str(&format!("Resolution rate:  {}%\n", stats.resolution_rate));

    for (heading, groups) in [
        ("By category", &stats.category_stats),
        ("By priority", &stats.priority_stats),
    ] {
        if groups.is_empty() {
            continue;
        }
        let rows: Vec<CountRow> = groups
            .iter()
            .map(|g| CountRow {
                value: g.id.clone(),
                count: g.count,
            })
            .collect();
        out.push('\n');
        out.push_str(heading);
        out.push('\n');
        out.push_str(&Table::new(rows).with(Style::rounded()).to_string());
        out.push('\n');
    }
    out
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_issue(issue: &ExternalIssue) {
    println!("{} {}", issue.id.cyan().bold(), issue.title.bold());
    println!();
    println!("Status:    {}", status_label(issue.status));
    println!("Priority:  {}", issue.priority);
    println!("Category:  {}", issue.category);
    println!("Location:  {}", issue.location);
    if let Some(ref ward) = issue.ward {
        println!("Ward:      {}", ward);
    }
    if let Some(coords) = issue.coordinates {
        println!("Coords:    {}, {}", coords.latitude, coords.longitude);
    }
    println!("Reported:  {} by {}", issue.date, issue.reported_by);
    println!("Updated:   {}", issue.last_update);
    if let Some(ref resolved) = issue.resolved_at {
        println!("Resolved:  {}", resolved);
    }
    if issue.assigned_to.is_some() {
        println!("Assigned:  yes");
    }

    println!();
    println!("{}", "Description:".bold());
    println!("{}", issue.description);

    if !issue.photos.is_empty() {
        println!();
        println!("{}", "Photos:".bold());
        for photo in &issue.photos {
            println!("  {}", photo);
        }
    }

    if let Some(ref timeline) = issue.timeline {
        println!();
        println!("{}", "Timeline:".bold());
        for entry in timeline {
            println!(
                "  {} {} - {} ({})",
                entry.at.dimmed(),
                status_label(entry.status),
                entry.note,
                entry.by
            );
        }
    }
}

pub async fn list(client: &ApiClient, params: ListParams, json: bool) -> Result<()> {
    let page = client.list_issues(&params).await?;

    if json {
        return print_json(&page.issues);
    }
    if page.issues.is_empty() {
        println!("No issues found");
        return Ok(());
    }
    println!("{}", render_issue_table(&page.issues));
    let info = &page.pagination;
    println!(
        "Page {}/{} ({} issues, {} per page)",
        info.current_page, info.total_pages, info.total_items, info.items_per_page
    );
    Ok(())
}

pub async fn show(client: &ApiClient, id: &str, json: bool) -> Result<()> {
    let issue = client.get_issue(id).await?;
    if json {
        return print_json(&issue);
    }
    print_issue(&issue);
    Ok(())
}

pub async fn create(client: &ApiClient, args: CreateArgs, json: bool) -> Result<()> {
    if let Some(ref category) = args.category
        && !is_suggested_category(category)
    {
        eprintln!(
            "{} '{}' is not a suggested category ({})",
            "note:".dimmed(),
            category,
            SUGGESTED_CATEGORIES.join(", ")
        );
    }
    let issue = client.create_issue(&args.into_request()).await?;
    if json {
        return print_json(&issue);
    }
    println!("{} Created issue: {}", "✓".green(), issue.id);
    println!("  Title:    {}", issue.title);
    println!("  Priority: {}", issue.priority);
    Ok(())
}

pub async fn status(
    client: &ApiClient,
    id: &str,
    status: &str,
    note: Option<String>,
    json: bool,
) -> Result<()> {
    let issue = client.update_status(id, status, note.as_deref()).await?;
    if json {
        return print_json(&issue);
    }
    println!(
        "{} {} is now {}",
        "✓".green(),
        issue.id,
        status_label(issue.status)
    );
    if let Some(entry) = issue.timeline.as_ref().and_then(|t| t.last()) {
        println!("  Note: {}", entry.note);
    }
    Ok(())
}

pub async fn search(
    client: &ApiClient,
    query: &str,
    limit: Option<usize>,
    json: bool,
) -> Result<()> {
    let issues = client.search(query, limit).await?;
    if json {
        return print_json(&issues);
    }
    if issues.is_empty() {
        println!("No issues match '{}'", query);
    } else {
        println!("{}", render_issue_table(&issues));
        println!("{} result(s)", issues.len());
    }
    Ok(())
}

pub async fn stats(client: &ApiClient, json: bool) -> Result<()> {
    let stats = client.stats().await?;
    if json {
        return print_json(&stats);
    }
    print!("{}", render_stats(&stats));
    Ok(())
}

fn print_migration(report: &MigrationReport, json: bool) -> Result<()> {
    if json {
        return print_json(report);
    }
    println!(
        "{} Migrated {} of {} issue(s)",
        "✓".green(),
        report.updated_issues,
        report.total_issues
    );
    for group in &report.final_stats {
        println!("  {:<12} {}", group.id, group.count);
    }
    Ok(())
}

pub async fn migrate(client: &ApiClient, json: bool) -> Result<()> {
    let report = client.migrate().await?;
    print_migration(&report, json)
}

/// Migrate a store file directly, without a running server
pub async fn migrate_local(path: &Path, json: bool) -> Result<()> {
    let store =
        Store::open(path).with_context(|| format!("Failed to open store {}", path.display()))?;
    let service = LifecycleService::new(store, ListingConfig::default());
    let report = service.migrate_legacy_statuses().await?;
    print_migration(&report, json)
}

pub async fn health(client: &ApiClient, json: bool) -> Result<()> {
    let health = client.health().await?;
    if json {
        return print_json(&health);
    }
    println!("{} {} ({})", "✓".green(), health.message, client.base_url());
    println!("  Database: {}", health.database);
    println!("  Issues:   {}", health.collections.issues);
    Ok(())
}

pub fn config_default() -> Result<()> {
    print!("{}", Config::default_with_comments());
    Ok(())
}

pub fn config_path() -> Result<()> {
    match Config::default_path() {
        Some(path) => println!("{}", path.display()),
        None => println!("No config directory available"),
    }
    Ok(())
}
