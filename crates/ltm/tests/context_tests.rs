//! Integration tests for budgeted context assembly and deferred loading

use std::path::Path;

use chrono::Utc;
use ltm::config::Config;
use ltm::engine::NewMemory;
use ltm::injection::Budget;
use ltm::injection::format::estimate_tokens;
use ltm::memory::types::{Agent, Impact, Memory, MemoryKind, Project, Region};
use ltm::signing::HmacSigner;
use ltm::storage::SqliteStore;
use ltm::Engine;

/// Test fixture: keyword-only engine for the agent "Anima"
fn create_test_engine() -> Engine {
    Engine::new(SqliteStore::open_in_memory().unwrap(), Config::default())
        .with_agent(Agent::new("anima", "Anima"))
}

fn create_test_project(engine: &Engine, path: &str) -> Project {
    engine.resolve_project(Path::new(path)).unwrap()
}

fn remember(engine: &Engine, text: &str, kind: MemoryKind, impact: Impact) -> Memory {
    engine
        .remember(NewMemory::new(text).kind(kind).impact(impact).region(Region::Agent))
        .unwrap()
        .memory
}

mod block_tests {
    use super::*;

    #[test]
    fn test_project_memory_renders_under_project_header() {
        let engine = create_test_engine();
        let project = create_test_project(&engine, "/work/webapp");
        engine
            .remember(
                NewMemory::new("Team chose SQLite for simplicity")
                    .kind(MemoryKind::Architectural)
                    .impact(Impact::High)
                    .region(Region::Project)
                    .in_project(project.clone()),
            )
            .unwrap();

        let context = engine.load_context(Some(&project), None, None).unwrap();
        assert_eq!(
            context.text,
            "[LTM:Anima@webapp]\n~ARCH:HIGH| Team chose SQLite for simplicity\n[/LTM]"
        );
        assert_eq!(context.stats.active, 1);
        assert_eq!(context.stats.project_memories, 1);
    }

    #[test]
    fn test_other_projects_stay_out() {
        let engine = create_test_engine();
        let webapp = create_test_project(&engine, "/work/webapp");
        let api = create_test_project(&engine, "/work/api");
        engine
            .remember(
                NewMemory::new("API uses Postgres")
                    .kind(MemoryKind::Architectural)
                    .impact(Impact::High)
                    .region(Region::Project)
                    .in_project(api),
            )
            .unwrap();
        remember(&engine, "Prefer small commits", MemoryKind::Learnings, Impact::Medium);

        let context = engine.load_context(Some(&webapp), None, None).unwrap();
        assert!(context.text.contains("~LEARN:MED| Prefer small commits"));
        assert!(!context.text.contains("Postgres"));
        assert_eq!(context.stats.agent_memories, 1);
        assert_eq!(context.stats.project_memories, 0);
    }

    #[test]
    fn test_without_project_only_agent_memories_appear() {
        let engine = create_test_engine();
        let project = create_test_project(&engine, "/work/webapp");
        engine
            .remember(
                NewMemory::new("Webapp build uses vite")
                    .kind(MemoryKind::Architectural)
                    .impact(Impact::High)
                    .region(Region::Project)
                    .in_project(project),
            )
            .unwrap();

        let context = engine.load_context(None, None, None).unwrap();
        assert_eq!(context.text, "[LTM:Anima]\n(no memories)\n[/LTM]");
    }

    #[test]
    fn test_deep_memories_need_recall() {
        let engine = create_test_engine();
        remember(&engine, "trivial naming nit", MemoryKind::Learnings, Impact::Low);

        let context = engine.load_context(None, None, None).unwrap();
        assert!(context.included_ids.is_empty());
        assert!(context.deferred_ids.is_empty());
    }

    #[test]
    fn test_signed_memories_are_trusted() {
        let engine = create_test_engine()
            .with_signer(Box::new(HmacSigner::new(b"context-key".to_vec()).unwrap()));
        remember(&engine, "Ship on Thursdays", MemoryKind::Learnings, Impact::High);

        let context = engine.load_context(None, None, None).unwrap();
        assert!(context.text.contains("~LEARN:HIGH| Ship on Thursdays"));
        assert_eq!(context.stats.untrusted, 0);
    }
}

mod budget_tests {
    use super::*;

    fn fill(engine: &Engine) {
        let impacts = [Impact::High, Impact::Medium];
        let kinds = [
            MemoryKind::Architectural,
            MemoryKind::Learnings,
            MemoryKind::Achievements,
            MemoryKind::Introspect,
        ];
        for i in 0..24 {
            remember(
                engine,
                &format!("Observation number {i} about the build pipeline and its caches"),
                kinds[i % kinds.len()],
                impacts[i % impacts.len()],
            );
        }
    }

    #[test]
    fn test_budget_is_never_exceeded_without_core() {
        let engine = create_test_engine();
        fill(&engine);

        for tokens in (40..=400).step_by(20) {
            let context = engine
                .load_context(None, None, Some(Budget::Tokens(tokens)))
                .unwrap();
            assert!(
                estimate_tokens(&context.text) <= tokens,
                "budget {tokens} exceeded: {}",
                context.stats.tokens_used
            );
            assert_eq!(context.included_ids.len() + context.deferred_ids.len(), 24);
        }
    }

    #[test]
    fn test_higher_impact_is_selected_first() {
        let engine = create_test_engine();
        fill(&engine);

        let context = engine
            .load_context(None, None, Some(Budget::Tokens(120)))
            .unwrap();
        assert!(!context.included_ids.is_empty());
        for id in &context.included_ids {
            let memory = engine.store().require_memory(*id).unwrap();
            assert_eq!(memory.impact, Impact::High);
        }
    }

    #[test]
    fn test_core_ignores_budget() {
        let engine = create_test_engine();
        for text in ["Never commit secrets", "Always run the full test suite", "Never skip code review"] {
            remember(&engine, text, MemoryKind::Learnings, Impact::Critical);
        }
        let active = remember(&engine, "Cache invalidation lives in build.rs", MemoryKind::Architectural, Impact::High);

        let context = engine
            .load_context(None, None, Some(Budget::Tokens(10)))
            .unwrap();
        assert_eq!(context.stats.core, 3);
        assert!(context.stats.tokens_used > 10);
        assert_eq!(context.deferred_ids, vec![active.id]);
        assert_eq!(
            context.text.lines().filter(|l| l.starts_with("~LEARN:CRIT|")).count(),
            3
        );
    }

    #[test]
    fn test_fully_deferred_block_says_so_within_budget() {
        let engine = create_test_engine();
        let memory = remember(
            &engine,
            "The release pipeline signs artifacts before upload to the mirror",
            MemoryKind::Architectural,
            Impact::High,
        );

        let context = engine
            .load_context(None, None, Some(Budget::Tokens(14)))
            .unwrap();
        assert_eq!(context.text, "[LTM:Anima]\n(all memories deferred)\n[/LTM]");
        assert_eq!(context.deferred_ids, vec![memory.id]);
        assert!(estimate_tokens(&context.text) <= 14);

        assert!(engine.load_context(None, None, Some(Budget::Tokens(5))).is_err());
    }

    #[test]
    fn test_fraction_budget() {
        let engine = create_test_engine();
        fill(&engine);

        let budget = Budget::fraction(1000, 0.1).unwrap();
        let context = engine.load_context(None, None, Some(budget)).unwrap();
        assert_eq!(context.stats.budget_tokens, 100);
        assert!(context.stats.tokens_used <= 100);
        assert!(Budget::fraction(1000, 1.5).is_err());
    }
}

mod deferred_tests {
    use super::*;

    #[test]
    fn test_deferred_drains_once() {
        let engine = create_test_engine();
        let first = remember(&engine, "Release notes go in CHANGELOG.md", MemoryKind::Learnings, Impact::High);
        let second = remember(&engine, "Benchmarks run nightly on the CI box", MemoryKind::Learnings, Impact::Medium);

        let context = engine
            .load_context(None, None, Some(Budget::Tokens(25)))
            .unwrap();
        assert_eq!(context.included_ids, vec![first.id]);
        assert_eq!(context.deferred_ids, vec![second.id]);

        let drained = engine.load_deferred(None, None).unwrap();
        assert_eq!(
            drained,
            "[LTM:Anima]\n~LEARN:MED| Benchmarks run nightly on the CI box\n[/LTM]"
        );
        assert_eq!(engine.load_deferred(None, None).unwrap(), "");
    }

    #[test]
    fn test_new_assembly_replaces_deferred_list() {
        let engine = create_test_engine();
        remember(&engine, "Release notes go in CHANGELOG.md", MemoryKind::Learnings, Impact::High);
        remember(&engine, "Benchmarks run nightly on the CI box", MemoryKind::Learnings, Impact::Medium);

        engine
            .load_context(None, None, Some(Budget::Tokens(25)))
            .unwrap();
        let roomy = engine.load_context(None, None, None).unwrap();
        assert!(roomy.deferred_ids.is_empty());
        assert_eq!(engine.load_deferred(None, None).unwrap(), "");
    }

    #[test]
    fn test_forgotten_deferred_memory_is_skipped() {
        let engine = create_test_engine();
        remember(&engine, "Release notes go in CHANGELOG.md", MemoryKind::Learnings, Impact::High);
        let second = remember(&engine, "Benchmarks run nightly on the CI box", MemoryKind::Learnings, Impact::Medium);

        engine
            .load_context(None, None, Some(Budget::Tokens(25)))
            .unwrap();
        engine.forget(&second.id.to_string()).unwrap();
        assert_eq!(engine.load_deferred(None, None).unwrap(), "");
    }

    #[test]
    fn test_deferred_lists_are_per_project() {
        let engine = create_test_engine();
        let project = create_test_project(&engine, "/work/webapp");
        remember(&engine, "Release notes go in CHANGELOG.md", MemoryKind::Learnings, Impact::High);
        remember(&engine, "Benchmarks run nightly on the CI box", MemoryKind::Learnings, Impact::Medium);

        engine
            .load_context(None, None, Some(Budget::Tokens(25)))
            .unwrap();
        assert_eq!(engine.load_deferred(Some(&project), None).unwrap(), "");
        assert!(!engine.load_deferred(None, None).unwrap().is_empty());
    }
}

mod subagent_tests {
    use super::*;

    #[test]
    fn test_subagent_inherits_primary_core() {
        let engine = create_test_engine();
        remember(&engine, "Protect the user's time", MemoryKind::Emotional, Impact::Critical);
        remember(&engine, "Primary-only working note", MemoryKind::Learnings, Impact::High);

        let scout = Agent::new("scout", "Scout");
        let mut own = Memory::new_at("scout", MemoryKind::Learnings, Impact::High, "Search the docs first", Utc::now());
        own.token_count = 10;
        engine.store().insert_memory(&own).unwrap();

        let context = engine.load_context(None, Some(&scout), None).unwrap();
        assert_eq!(
            context.text,
            "[LTM:Scout]\n~EMOT:CRIT^| Protect the user's time\n~LEARN:HIGH| Search the docs first\n[/LTM]"
        );
        assert_eq!(context.stats.inherited, 1);
    }

    #[test]
    fn test_primary_loading_itself_is_not_inherited() {
        let engine = create_test_engine();
        remember(&engine, "Protect the user's time", MemoryKind::Emotional, Impact::Critical);

        let me = engine.agent().clone();
        let context = engine.load_context(None, Some(&me), None).unwrap();
        assert!(context.text.contains("~EMOT:CRIT| Protect the user's time"));
        assert_eq!(context.stats.inherited, 0);
    }
}
