use comfy_table::{Cell, ContentArrangement, Table};
use console::{StyledObject, style};
use daemon_harness::Result;
use daemon_harness::management::{DaemonManagement, EntryStatus};
use daemon_harness::procs::PROCS;

/// Shows every daemon and service with its PID and state
#[derive(Debug, clap::Args)]
#[clap(
    visible_alias = "ls",
    verbatim_doc_comment,
    long_about = "\
Shows every daemon and service with its PID and state

A daemon whose PID file is present but whose process is gone is shown as
'stale'; the next start removes the leftover file.

Output:
  Name  Kind     Daemon  PID    Status
  api   daemon           12345  running
  web   service  nginx   -      stopped"
)]
pub struct Status {
    /// Hide the table header row
    #[clap(long)]
    hide_header: bool,
}

impl Status {
    pub fn run(&self, management: &DaemonManagement) -> Result<()> {
        let mut table = Table::new();
        table
            .load_preset(comfy_table::presets::NOTHING)
            .set_content_arrangement(ContentArrangement::Dynamic);
        if !self.hide_header {
            table.set_header(vec!["Name", "Kind", "Daemon", "PID", "Status"]);
        }
        for entry in management.status() {
            table.add_row(vec![
                Cell::new(&entry.name),
                Cell::new(entry.kind),
                Cell::new(entry.daemon.as_deref().unwrap_or_default()),
                Cell::new(entry.pid.map(|p| p.to_string()).unwrap_or("-".into())),
                Cell::new(state(&entry)),
            ]);
        }
        for line in table.to_string().lines() {
            println!("{}", line.trim_end());
        }
        Ok(())
    }
}

fn state(entry: &EntryStatus) -> StyledObject<&'static str> {
    match (entry.started, entry.pid) {
        (true, Some(pid)) if PROCS.is_running(pid) => style("running").green(),
        (true, _) => style("stale").yellow(),
        (false, _) => style("stopped").dim(),
    }
}
