use comfy_table::{modifiers::UTF8_ROUND_CORNERS, presets, Attribute, Cell, Color, Table};
use shieldrun_core::model::JobId;

/// Result of handling one work item in a per-item loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ItemOutcome {
    Submitted(JobId),
    Skipped { reason: String },
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ItemReport {
    pub item: String,
    pub outcome: ItemOutcome,
}

impl ItemReport {
    pub fn submitted(item: &str, job_id: JobId) -> Self {
        Self {
            item: item.to_string(),
            outcome: ItemOutcome::Submitted(job_id),
        }
    }

    pub fn skipped(item: &str, reason: impl Into<String>) -> Self {
        Self {
            item: item.to_string(),
            outcome: ItemOutcome::Skipped {
                reason: reason.into(),
            },
        }
    }

    pub fn failed(item: &str, error: impl Into<String>) -> Self {
        Self {
            item: item.to_string(),
            outcome: ItemOutcome::Failed {
                error: error.into(),
            },
        }
    }
}

/// Per-item outcomes of a fan-out, in the order the items were handled.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FanoutReport {
    pub items: Vec<ItemReport>,
}

impl FanoutReport {
    pub fn push(&mut self, report: ItemReport) {
        self.items.push(report);
    }

    pub fn job_ids(&self) -> Vec<JobId> {
        self.items
            .iter()
            .filter_map(|r| match &r.outcome {
                ItemOutcome::Submitted(id) => Some(id.clone()),
                _ => None,
            })
            .collect()
    }

    pub fn submitted(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Submitted(_)))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Skipped { .. }))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, ItemOutcome::Failed { .. }))
    }

    fn count(&self, pred: impl Fn(&ItemOutcome) -> bool) -> usize {
        self.items.iter().filter(|r| pred(&r.outcome)).count()
    }

    pub fn counts_line(&self) -> String {
        format!(
            "{} submitted, {} skipped, {} failed",
            self.submitted(),
            self.skipped(),
            self.failed()
        )
    }

    pub fn to_table(&self) -> Table {
        let mut table = styled_table(&["Model", "Result", "Detail"]);
        for report in &self.items {
            let (status, detail) = match &report.outcome {
                ItemOutcome::Submitted(id) => (Cell::new("submitted").fg(Color::Green), id.to_string()),
                ItemOutcome::Skipped { reason } => (Cell::new("skipped").fg(Color::Yellow), reason.clone()),
                ItemOutcome::Failed { error } => (Cell::new("failed").fg(Color::Red), error.clone()),
            };
            table.add_row(vec![Cell::new(&report.item), status, Cell::new(detail)]);
        }
        table
    }
}

pub fn styled_table(headers: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL)
        .apply_modifier(UTF8_ROUND_CORNERS)
        .set_header(
            headers
                .iter()
                .map(|h| Cell::new(h).add_attribute(Attribute::Bold).fg(Color::Cyan))
                .collect::<Vec<_>>(),
        );
    table
}
