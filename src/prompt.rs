//! Prompt rendering for playbook phases.
//!
//! A rendered prompt has four parts, in order:
//! 1. a header naming the phase and the exact task parameters
//! 2. the context block with truncated output of earlier phases (if any)
//! 3. the phase body, from a template file or the built-in brief
//! 4. a completion checklist footer

use crate::ledger::{AuditParams, PriorContext};
use crate::phase::{PhaseId, TOTAL_PHASES};
use anyhow::{Context, Result, bail};
use std::path::{Path, PathBuf};

/// Turns a phase, the run parameters and earlier output into a prompt.
pub trait PromptRenderer: Send + Sync {
    fn render(&self, phase: PhaseId, params: &AuditParams, prior: &PriorContext) -> Result<String>;
}

/// Directory holding the phase templates of a playbook, `<root>/<playbook_id>-phases`.
pub fn templates_dir_for(root: &Path, playbook_id: &str) -> PathBuf {
    root.join(format!("{}-phases", playbook_id))
}

/// Renderer backed by `phase_<n>.txt` templates or the built-in briefs.
#[derive(Debug, Clone, Default)]
pub struct TemplateRenderer {
    templates_dir: Option<PathBuf>,
}

impl TemplateRenderer {
    /// Renderer using the built-in phase briefs.
    pub fn new() -> Self {
        Self::default()
    }

    /// Renderer reading `phase_<n>.txt` from `dir`. A missing file is a render error.
    pub fn with_templates_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            templates_dir: Some(dir.into()),
        }
    }

    pub fn templates_dir(&self) -> Option<&Path> {
        self.templates_dir.as_deref()
    }

    fn load_body(&self, phase: PhaseId) -> Result<String> {
        let Some(dir) = &self.templates_dir else {
            return Ok(phase.brief().to_string());
        };
        let path = dir.join(format!("phase_{}.txt", phase.number()));
        if !path.exists() {
            bail!("Template file not found: {}", path.display());
        }
        std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read template: {}", path.display()))
    }
}

impl PromptRenderer for TemplateRenderer {
    fn render(&self, phase: PhaseId, params: &AuditParams, prior: &PriorContext) -> Result<String> {
        let body = substitute(&self.load_body(phase)?, params);

        let mut prompt = render_header(phase, params, prior);
        if !prior.is_empty() {
            prompt.push_str(&render_context(prior));
            prompt.push_str("\n\n---\n\n");
        }
        prompt.push_str(&body);
        prompt.push_str(&render_footer(phase));
        Ok(prompt)
    }
}

fn substitute(template: &str, params: &AuditParams) -> String {
    let domains = params
        .competitor_domains
        .iter()
        .map(|d| format!("- {}", d))
        .collect::<Vec<_>>()
        .join("\n");
    template
        .replace("{{competitor_domains}}", &domains)
        .replace("{{my_domain}}", params.my_domain.as_deref().unwrap_or("N/A"))
        .replace("{{primary_market}}", &params.primary_market)
}

fn render_header(phase: PhaseId, params: &AuditParams, prior: &PriorContext) -> String {
    let competitors = if params.competitor_domains.is_empty() {
        "N/A".to_string()
    } else {
        params.competitor_domains.join(", ")
    };

    let mut header = format!(
        r#"
🎯 **EXECUTING PHASE {n} OF {total}: {name}**

You are executing Phase {n} of the Competitor SEO Growth Engine Audit.

**YOUR TASK PARAMETERS** (USE THESE EXACT VALUES):
- **Your Domain**: {mine}
- **Competitor Domains**: {competitors}
- **All Domains to Analyze**: {all}
- **Target Market/Database**: {market}
"#,
        n = phase.number(),
        total = TOTAL_PHASES,
        name = phase.display_name(),
        mine = params.my_domain.as_deref().unwrap_or("N/A"),
        competitors = competitors,
        all = params.all_domains().join(", "),
        market = params.primary_market,
    );

    if phase == PhaseId::INVESTIGATION && !prior.flagged_domains.is_empty() {
        header.push_str(&format!(
            "- **Domains Flagged For Investigation**: {}\n",
            prior.flagged_domains.join(", ")
        ));
    }

    header.push_str(
        r#"
**CRITICAL RULES FOR THIS PHASE**:
1. Execute EVERY step in this phase using the domains listed above
2. Do NOT ask for the domain list - it is already provided above
3. Do NOT skip ahead to the next phase
4. If data is missing, fall back to web search tools
5. Verify completion before finishing
6. **AUTOMATED EXECUTION MODE**: This is a fully automated pipeline. Do NOT ask the user any questions, do NOT request confirmation - just execute and complete the phase.

---

"#,
    );
    header
}

fn render_context(prior: &PriorContext) -> String {
    let mut context = String::from("## **Context from Previous Phases:**\n\n");
    for section in &prior.sections {
        context.push_str(&format!(
            "### Phase {} Results:\n```\n{}\n```\n",
            section.phase, section.text
        ));
        if section.truncated {
            context.push_str("_(output truncated to fit the context budget)_\n");
        }
        context.push('\n');
    }
    context
}

fn render_footer(phase: PhaseId) -> String {
    format!(
        r#"

---

✅ **PHASE {n} COMPLETION CHECKLIST**:

Before finishing, verify:
- [ ] All required data calls made
- [ ] All data collected (or fallback used if a provider failed)
- [ ] All calculations performed
- [ ] All "CRITICAL" instructions followed
- [ ] Results structured correctly for the next phase

If ANY item is not checked, GO BACK and complete it.

**AFTER COMPLETION**: Provide structured output for Phase {n} results.

⚠️ **REMINDER**: This is an automated pipeline. End with your analysis output only. Do NOT ask questions like "Would you like to proceed?" - the system continues to the next phase automatically.
"#,
        n = phase.number()
    )
}
