//! Application state: the cached problem catalog, prompts, and the optional
//! external clients (model, SMTP).
//!
//! Everything here is read-only after startup. Per-student mutable state
//! lives in `controller::StudentSession`, owned by one WebSocket task; the
//! catalog is the only process-wide shared resource and it never changes.

use std::collections::BTreeMap;

use rand::seq::SliceRandom;
use tracing::{info, instrument, warn};

use crate::catalog::{load_catalog, CatalogDiagnostic};
use crate::config::{load_tutor_config_from_env, Prompts, TutorConfig, DEFAULT_INSTRUCTOR_EMAIL};
use crate::domain::ProblemRecord;
use crate::mailer::Mailer;
use crate::openai::OpenAI;

#[derive(Clone)]
pub struct AppState {
    pub problems: Vec<ProblemRecord>,
    pub catalog_diagnostic: Option<CatalogDiagnostic>,
    pub prompts: Prompts,
    pub lectures: Vec<String>,
    pub instructor_email: String,
    pub openai: Option<OpenAI>,
    pub mailer: Option<Mailer>,
}

impl AppState {
    /// Build state from env: load catalog and config, init model + mailer.
    #[instrument(level = "info", skip_all)]
    pub fn new() -> Self {
        let cfg = load_tutor_config_from_env().unwrap_or_else(TutorConfig::default);
        let prompts = cfg.prompts.clone();
        let lectures = cfg.lectures_or_default();
        let instructor_email = cfg
            .instructor_email
            .clone()
            .unwrap_or_else(|| DEFAULT_INSTRUCTOR_EMAIL.to_string());

        let catalog = load_catalog();
        let problems = catalog.problems.clone();
        let catalog_diagnostic = catalog.diagnostic.clone();

        // Inventory summary by category prefix.
        let mut count_by_prefix: BTreeMap<&str, usize> = BTreeMap::new();
        for p in &problems {
            *count_by_prefix.entry(p.category_prefix()).or_insert(0) += 1;
        }
        for (prefix, count) in &count_by_prefix {
            info!(target: "catalog", %prefix, count, "Startup problem inventory");
        }
        if problems.is_empty() {
            warn!(target: "catalog", "Catalog is empty; practice mode will reject category selection");
        }

        let openai = OpenAI::from_env();
        if let Some(oa) = &openai {
            info!(target: "tutor_backend", base_url = %oa.base_url, fast_model = %oa.fast_model, strong_model = %oa.strong_model, "Model client enabled.");
        } else {
            info!(target: "tutor_backend", "Model client disabled (no OPENAI_API_KEY). Tutor turns will fail soft.");
        }

        let mailer = Mailer::from_env();
        if mailer.is_none() {
            info!(target: "tutor_backend", "Email disabled (EMAIL_SENDER/EMAIL_PASSWORD not set). Reports will not be delivered.");
        }

        Self {
            problems,
            catalog_diagnostic,
            prompts,
            lectures,
            instructor_email,
            openai,
            mailer,
        }
    }

    /// Menu entries: (category prefix, display label, problem count), sorted
    /// by prefix for a stable menu.
    pub fn categories(&self) -> Vec<(String, String, usize)> {
        let mut by_prefix: BTreeMap<&str, (&str, usize)> = BTreeMap::new();
        for p in &self.problems {
            let entry = by_prefix.entry(p.category_prefix()).or_insert((p.category.as_str(), 0));
            entry.1 += 1;
        }
        by_prefix
            .into_iter()
            .map(|(prefix, (label, count))| (prefix.to_string(), label.to_string(), count))
            .collect()
    }

    /// Uniform random draw among the problems of one category prefix,
    /// optionally excluding the just-completed one. If exclusion would empty
    /// the pool, the excluded problem may repeat.
    #[instrument(level = "debug", skip(self), fields(%category, ?exclude))]
    pub fn choose_problem(&self, category: &str, exclude: Option<&str>) -> Option<ProblemRecord> {
        let pool: Vec<&ProblemRecord> =
            self.problems.iter().filter(|p| p.category_prefix() == category).collect();
        if pool.is_empty() {
            return None;
        }
        let narrowed: Vec<&ProblemRecord> = match exclude {
            Some(id) => pool.iter().copied().filter(|p| p.id != id).collect(),
            None => pool.clone(),
        };
        let effective = if narrowed.is_empty() { &pool } else { &narrowed };
        let mut rng = rand::thread_rng();
        effective.choose(&mut rng).map(|p| (*p).clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::default_lectures;
    use std::collections::HashMap;

    fn problem(id: &str, category: &str) -> ProblemRecord {
        ProblemRecord {
            id: id.into(),
            category: category.into(),
            statement: "s".into(),
            targets: HashMap::new(),
        }
    }

    fn state_with(problems: Vec<ProblemRecord>) -> AppState {
        AppState {
            problems,
            catalog_diagnostic: None,
            prompts: Prompts::default(),
            lectures: default_lectures(),
            instructor_email: "instructor@example.edu".into(),
            openai: None,
            mailer: None,
        }
    }

    #[test]
    fn categories_group_by_id_prefix() {
        let state = state_with(vec![
            problem("CAL_1_01", "Limits"),
            problem("CAL_1_02", "Limits"),
            problem("CAL_2_01", "Derivatives"),
        ]);
        let cats = state.categories();
        assert_eq!(cats.len(), 2);
        assert_eq!(cats[0], ("CAL_1".to_string(), "Limits".to_string(), 2));
        assert_eq!(cats[1], ("CAL_2".to_string(), "Derivatives".to_string(), 1));
    }

    #[test]
    fn choose_problem_respects_exclusion_until_pool_would_empty() {
        let state = state_with(vec![problem("CAL_1_01", "Limits"), problem("CAL_1_02", "Limits")]);
        for _ in 0..20 {
            let p = state.choose_problem("CAL_1", Some("CAL_1_01")).expect("problem");
            assert_eq!(p.id, "CAL_1_02");
        }
        // Sole problem: exclusion falls back to repeating it.
        let state = state_with(vec![problem("CAL_1_01", "Limits")]);
        let p = state.choose_problem("CAL_1", Some("CAL_1_01")).expect("problem");
        assert_eq!(p.id, "CAL_1_01");
    }

    #[test]
    fn unknown_category_yields_none() {
        let state = state_with(vec![problem("CAL_1_01", "Limits")]);
        assert!(state.choose_problem("CAL_9", None).is_none());
    }
}
