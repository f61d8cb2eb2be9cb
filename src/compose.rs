//! Message composition: a title with the total, a bounded preview, and an
//! optional "omitted" footer, rendered as plain text or markdown.
//!
//! Every slot has a built-in default per listing kind. A configured override
//! that cannot be rendered (unknown placeholder, stray brace) falls back to
//! that default instead of failing the run.
use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::config::MessageTemplates;
use crate::model::{DuplicateJobcode, FailedPush, Fields, JobcodeRow, NewRow, OutputFormat};

pub const DEFAULT_MAX_PREVIEW: usize = 5;

static PLACEHOLDER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\{\{|\}\}|\{([^{}]*)\}|[{}]").unwrap());

/// Default templates for one listing kind.
#[derive(Debug, Clone, Copy)]
pub struct Defaults {
    pub title_text: &'static str,
    pub item_text: &'static str,
    pub footer_text: &'static str,
    pub title_markdown: &'static str,
    pub item_markdown: &'static str,
    pub footer_markdown: &'static str,
}

/// A row kind that can be listed in a message.
pub trait Listing: Fields {
    const DEFAULTS: Defaults;
}

impl Listing for JobcodeRow {
    const DEFAULTS: Defaults = Defaults {
        title_text: "数据库告警：检测到 {count} 个有值的 jobcode",
        item_text: "jobcode={jobcode}",
        footer_text: "更多...（已省略 {omitted} 条）",
        title_markdown: "## 数据库告警：检测到 {count} 个有值的 jobcode",
        item_markdown: "- jobcode={jobcode}",
        footer_markdown: "> 更多...（已省略 {omitted} 条）",
    };
}

impl Listing for DuplicateJobcode {
    const DEFAULTS: Defaults = Defaults {
        title_text: "数据库告警：检测到 {count} 个重复的 jobcode",
        item_text: "jobcode={jobcode}，重复 {dup_count} 次",
        footer_text: "更多...（已省略 {omitted} 条）",
        title_markdown: "## 数据库告警：检测到 {count} 个重复的 jobcode",
        item_markdown: "- jobcode={jobcode} ｜ 重复 {dup_count} 次",
        footer_markdown: "> 更多...（已省略 {omitted} 条）",
    };
}

impl Listing for FailedPush {
    const DEFAULTS: Defaults = Defaults {
        title_text: "推送告警：检测到 {count} 条推送失败记录",
        item_text: "单号={field0001}，状态={field0045}",
        footer_text: "更多...（已省略 {omitted} 条）",
        title_markdown: "## 推送告警：检测到 {count} 条推送失败记录",
        item_markdown: "- 单号={field0001} ｜ 状态={field0045}",
        footer_markdown: "> 更多...（已省略 {omitted} 条）",
    };
}

impl Listing for NewRow {
    const DEFAULTS: Defaults = Defaults {
        title_text: "数据库告警：检测到 {count} 条新数据",
        item_text: "id={id}，{title}（{created_at}）",
        footer_text: "更多...（已省略 {omitted} 条）",
        title_markdown: "## 数据库告警：检测到 {count} 条新数据",
        item_markdown: "- id={id} ｜ {title} ｜ {created_at}",
        footer_markdown: "> 更多...（已省略 {omitted} 条）",
    };
}

/// Substitute `{name}` placeholders. `{{` and `}}` are literal braces.
/// Returns `None` when a name is unknown or a brace is unbalanced.
pub fn render<F>(template: &str, lookup: F) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    let mut out = String::with_capacity(template.len());
    let mut last = 0;
    for caps in PLACEHOLDER.captures_iter(template) {
        let whole = caps.get(0)?;
        out.push_str(&template[last..whole.start()]);
        match whole.as_str() {
            "{{" => out.push('{'),
            "}}" => out.push('}'),
            _ => {
                let name = caps.get(1)?.as_str();
                if name.is_empty() {
                    return None;
                }
                out.push_str(&lookup(name)?);
            }
        }
        last = whole.end();
    }
    out.push_str(&template[last..]);
    Some(out)
}

fn render_or_default<F>(configured: Option<&str>, default: &'static str, lookup: F) -> String
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(tpl) = configured {
        if let Some(line) = render(tpl, &lookup) {
            return line;
        }
        debug!(template = tpl, "template override not renderable, using default");
    }
    render(default, &lookup).unwrap_or_else(|| default.to_string())
}

/// Renders row listings with the configured template overrides.
#[derive(Debug, Clone, Copy)]
pub struct Composer<'a> {
    templates: &'a MessageTemplates,
    max_preview: usize,
}

impl<'a> Composer<'a> {
    pub fn new(templates: &'a MessageTemplates, max_preview: usize) -> Self {
        Self {
            templates,
            max_preview,
        }
    }

    pub fn compose<R: Listing>(&self, rows: &[R], format: OutputFormat) -> Option<String> {
        match format {
            OutputFormat::Text => self.text(rows),
            OutputFormat::Markdown => self.markdown(rows),
        }
    }

    pub fn text<R: Listing>(&self, rows: &[R]) -> Option<String> {
        let t = self.templates;
        let d = R::DEFAULTS;
        self.layout(
            rows,
            (t.title_text.as_deref(), d.title_text),
            (t.item_text.as_deref(), d.item_text),
            (t.footer_text.as_deref(), d.footer_text),
            false,
        )
    }

    pub fn markdown<R: Listing>(&self, rows: &[R]) -> Option<String> {
        let t = self.templates;
        let d = R::DEFAULTS;
        self.layout(
            rows,
            (t.title_markdown.as_deref(), d.title_markdown),
            (t.item_markdown.as_deref(), d.item_markdown),
            (t.footer_markdown.as_deref(), d.footer_markdown),
            true,
        )
    }

    pub fn jobcode_text(&self, rows: &[JobcodeRow]) -> Option<String> {
        self.text(rows)
    }

    pub fn jobcode_markdown(&self, rows: &[JobcodeRow]) -> Option<String> {
        self.markdown(rows)
    }

    pub fn duplicate_text(&self, rows: &[DuplicateJobcode]) -> Option<String> {
        self.text(rows)
    }

    pub fn duplicate_markdown(&self, rows: &[DuplicateJobcode]) -> Option<String> {
        self.markdown(rows)
    }

    pub fn failed_push_text(&self, rows: &[FailedPush]) -> Option<String> {
        self.text(rows)
    }

    pub fn failed_push_markdown(&self, rows: &[FailedPush]) -> Option<String> {
        self.markdown(rows)
    }

    fn layout<R: Listing>(
        &self,
        rows: &[R],
        title: (Option<&str>, &'static str),
        item: (Option<&str>, &'static str),
        footer: (Option<&str>, &'static str),
        markdown: bool,
    ) -> Option<String> {
        let count = rows.len();
        if count == 0 {
            return None;
        }
        let shown = count.min(self.max_preview);
        let omitted = count - shown;
        let totals = |name: &str| match name {
            "count" => Some(count.to_string()),
            "omitted" => Some(omitted.to_string()),
            _ => None,
        };

        let mut lines = Vec::with_capacity(shown + 4);
        lines.push(render_or_default(title.0, title.1, totals));
        lines.push(if markdown { String::new() } else { "——".to_string() });
        for row in &rows[..shown] {
            lines.push(render_or_default(item.0, item.1, |name| row.field(name)));
        }
        if omitted > 0 {
            if markdown {
                lines.push(String::new());
            }
            lines.push(render_or_default(footer.0, footer.1, totals));
        }
        Some(lines.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn jobcodes(n: usize) -> Vec<JobcodeRow> {
        (0..n)
            .map(|i| JobcodeRow {
                jobcode: format!("JC-{i:03}"),
            })
            .collect()
    }

    #[test]
    fn empty_rows_yield_none() {
        let t = MessageTemplates::default();
        let c = Composer::new(&t, DEFAULT_MAX_PREVIEW);
        assert!(c.jobcode_text(&[]).is_none());
        assert!(c.jobcode_markdown(&[]).is_none());
        assert!(c.duplicate_text(&[]).is_none());
        assert!(c.failed_push_markdown(&[]).is_none());
        assert!(c.jobcode_text(&jobcodes(1)).is_some());
        assert!(c.jobcode_markdown(&jobcodes(1)).is_some());
    }

    #[test]
    fn text_layout_without_footer() {
        let t = MessageTemplates::default();
        let c = Composer::new(&t, 5);
        let msg = c.jobcode_text(&jobcodes(2)).unwrap();
        assert_eq!(
            msg,
            "数据库告警：检测到 2 个有值的 jobcode\n——\njobcode=JC-000\njobcode=JC-001"
        );
        let msg = c.jobcode_text(&jobcodes(5)).unwrap();
        assert!(!msg.contains("已省略"));
    }

    #[test]
    fn footer_counts_omitted_rows() {
        let t = MessageTemplates::default();
        let c = Composer::new(&t, 5);
        let msg = c.jobcode_markdown(&jobcodes(8)).unwrap();
        let lines: Vec<&str> = msg.lines().collect();
        assert_eq!(lines[0], "## 数据库告警：检测到 8 个有值的 jobcode");
        assert_eq!(lines[1], "");
        assert_eq!(lines.iter().filter(|l| l.starts_with("- jobcode=")).count(), 5);
        assert_eq!(lines[lines.len() - 2], "");
        assert_eq!(lines[lines.len() - 1], "> 更多...（已省略 3 条）");
    }

    #[test]
    fn duplicate_listing_shows_counts() {
        let t = MessageTemplates::default();
        let c = Composer::new(&t, 5);
        let rows = vec![DuplicateJobcode {
            jobcode: "JC-999".into(),
            dup_count: 2,
        }];
        let msg = c.duplicate_text(&rows).unwrap();
        assert!(msg.contains("jobcode=JC-999，重复 2 次"));
        let msg = c.duplicate_markdown(&rows).unwrap();
        assert!(msg.starts_with("## "));
    }

    #[test]
    fn overrides_are_applied() {
        let t = MessageTemplates {
            title_text: Some("{count} hits".into()),
            item_text: Some("* {field0001} [{field0045}]".into()),
            footer_text: Some("+{omitted} more of {count}".into()),
            ..Default::default()
        };
        let c = Composer::new(&t, 1);
        let rows = vec![
            FailedPush {
                field0001: "A1".into(),
                field0045: "2".into(),
            },
            FailedPush {
                field0001: "A2".into(),
                field0045: "2".into(),
            },
        ];
        let msg = c.failed_push_text(&rows).unwrap();
        assert_eq!(msg, "2 hits\n——\n* A1 [2]\n+1 more of 2");
    }

    #[test]
    fn broken_override_falls_back_to_default() {
        let t = MessageTemplates {
            item_markdown: Some("- {jobcode".into()),
            item_text: Some("- {no_such_field}".into()),
            title_text: Some("{count:d} rows".into()),
            ..Default::default()
        };
        let c = Composer::new(&t, 5);
        let msg = c.jobcode_markdown(&jobcodes(1)).unwrap();
        assert!(msg.contains("- jobcode=JC-000"));
        let msg = c.jobcode_text(&jobcodes(1)).unwrap();
        assert!(msg.starts_with("数据库告警：检测到 1 个"));
        assert!(msg.ends_with("jobcode=JC-000"));
    }

    #[test]
    fn override_for_another_kind_falls_back_per_kind() {
        let t = MessageTemplates {
            item_text: Some("code {jobcode}".into()),
            ..Default::default()
        };
        let c = Composer::new(&t, 5);
        let jobs = c.jobcode_text(&jobcodes(1)).unwrap();
        assert!(jobs.ends_with("code JC-000"));
        let pushes = c
            .failed_push_text(&[FailedPush {
                field0001: "X".into(),
                field0045: "2".into(),
            }])
            .unwrap();
        assert!(pushes.ends_with("单号=X，状态=2"));
    }

    #[test]
    fn render_handles_escapes() {
        let out = render("{{literal}} {x}", |n| (n == "x").then(|| "1".to_string()));
        assert_eq!(out.as_deref(), Some("{literal} 1"));
        assert!(render("oops }", |_| None).is_none());
        assert!(render("{}", |_| Some("v".into())).is_none());
        assert_eq!(render("plain", |_| None).as_deref(), Some("plain"));
    }

    #[test]
    fn new_rows_listing() {
        let t = MessageTemplates::default();
        let c = Composer::new(&t, 5);
        let rows = vec![NewRow {
            id: 7,
            title: "disk full".into(),
            created_at: "2024-01-01 00:00:00".into(),
        }];
        let msg = c.compose(&rows, OutputFormat::Text).unwrap();
        assert!(msg.ends_with("id=7，disk full（2024-01-01 00:00:00）"));
    }
}
