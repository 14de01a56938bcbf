//! Markdown run report
//!
//! Written at the end of every run: session metadata, page counts, failed
//! pages with their last error, and the links the resolver left unresolved.

use crate::output::stats::CrawlStatistics;
use crate::output::OutputResult;
use crate::resolve::ResolutionReport;
use crate::state::{PageStatus, SessionSnapshot};
use std::fs;
use std::path::Path;

/// Everything the report covers
#[derive(Debug, Clone)]
pub struct RunReport<'a> {
    pub session: &'a SessionSnapshot,
    pub stats: &'a CrawlStatistics,
    /// `None` when the run skipped link resolution
    pub resolution: Option<&'a ResolutionReport>,
}

/// Maximum rows listed per table
const MAX_ROWS: usize = 200;

impl RunReport<'_> {
    /// Formats the report as Markdown
    pub fn render(&self) -> String {
        let mut md = String::new();

        md.push_str("# Documentation Mirror Report\n\n");

        md.push_str("## Session\n\n");
        md.push_str(&format!("- **Crawl root**: {}\n", self.session.crawl_root));
        md.push_str(&format!("- **Started**: {}\n", self.session.started_at));
        md.push_str(&format!(
            "- **Updated**: {}\n",
            self.session.updated_at.as_deref().unwrap_or("-")
        ));
        md.push_str(&format!(
            "- **Outcome**: {}\n",
            self.session.outcome.as_deref().unwrap_or("running")
        ));
        md.push_str(&format!("- **Config hash**: {}\n\n", self.session.config_hash));

        md.push_str("## Counters\n\n");
        md.push_str(&format!("- **Fetched**: {}\n", self.session.fetched));
        md.push_str(&format!("- **Failed**: {}\n", self.session.failed));
        md.push_str(&format!("- **Skipped**: {}\n", self.session.skipped));
        md.push_str(&format!("- **Redirected**: {}\n\n", self.session.redirected));

        md.push_str("## Pages by Status\n\n");
        md.push_str("| Status | Count |\n|---|---|\n");
        for status in PageStatus::all() {
            md.push_str(&format!("| {} | {} |\n", status, self.stats.count(status)));
        }
        md.push_str(&format!("| **Total** | {} |\n\n", self.stats.total_pages));
        md.push_str(&format!(
            "Redirect edges recorded: {}\n\n",
            self.stats.redirects
        ));

        if !self.stats.failed_pages.is_empty() {
            md.push_str("## Failed Pages\n\n");
            md.push_str("| URL | Attempts | Permanent | Last error |\n|---|---|---|---|\n");
            for page in self.stats.failed_pages.iter().take(MAX_ROWS) {
                md.push_str(&format!(
                    "| {} | {} | {} | {} |\n",
                    page.url,
                    page.attempts,
                    if page.permanent { "yes" } else { "no" },
                    escape_cell(page.last_error.as_deref().unwrap_or(""))
                ));
            }
            truncated_note(&mut md, self.stats.failed_pages.len());
            md.push('\n');
        }

        if let Some(resolution) = self.resolution {
            md.push_str("## Link Resolution\n\n");
            md.push_str(&format!("- **Documents**: {}\n", resolution.documents));
            md.push_str(&format!(
                "- **Documents rewritten**: {}\n",
                resolution.documents_changed
            ));
            md.push_str(&format!("- **Links resolved**: {}\n", resolution.links_resolved));
            md.push_str(&format!("- **Through redirects**: {}\n", resolution.via_redirect));
            md.push_str(&format!(
                "- **To folder notes**: {}\n",
                resolution.via_folder_note
            ));
            md.push_str(&format!("- **By title**: {}\n", resolution.via_title));
            md.push_str(&format!(
                "- **Slug wikilinks repaired**: {}\n",
                resolution.slugs_repaired
            ));
            md.push_str(&format!("- **Unresolved**: {}\n\n", resolution.unresolved.len()));

            if !resolution.unresolved.is_empty() {
                md.push_str("### Unresolved Links\n\n");
                md.push_str("| Document | Target | Text |\n|---|---|---|\n");
                for link in resolution.unresolved.iter().take(MAX_ROWS) {
                    md.push_str(&format!(
                        "| {} | {} | {} |\n",
                        escape_cell(&link.document),
                        escape_cell(&link.target),
                        escape_cell(&link.text)
                    ));
                }
                truncated_note(&mut md, resolution.unresolved.len());
                md.push('\n');
            }
        }

        md
    }

    /// Writes the report to `path`, creating parent directories
    pub fn write_to(&self, path: &Path) -> OutputResult<()> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)?;
        }
        fs::write(path, self.render())?;
        Ok(())
    }
}

fn truncated_note(md: &mut String, total: usize) {
    if total > MAX_ROWS {
        md.push_str(&format!("\n_{} more not shown._\n", total - MAX_ROWS));
    }
}

fn escape_cell(s: &str) -> String {
    s.replace('|', "\\|").replace('\n', " ")
}
