//! Engine facade
//!
//! [`Engine`] ties the store, embedder, signer and configuration together
//! and exposes the operations host glue calls: remember, supersede, recall,
//! forget, load-context, load-deferred, end-session, curious, research,
//! dissonance and backfill. Each mutating operation commits as a single transaction.

use std::cell::OnceCell;
use std::path::Path;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use crate::config::Config;
use crate::curiosity::{CuriosityFilter, CuriosityItem, CuriosityQueue};
use crate::decay::{DecayEngine, DecaySummary};
use crate::dissonance::{Dissonance, DissonanceDetail, DissonanceQueue};
use crate::embedding::{DEFAULT_MODEL_TAG, Embedder, FastEmbedder};
use crate::error::{LtmError, Result};
use crate::graph::{
    BackfillReport, LinkReport, LinkedMemory, Linker, backfill_embeddings, linked_memories,
    supersession_chain,
};
use crate::injection::format::line_token_count;
use crate::injection::{AssembledContext, Budget, ContextAssembler, ContextRequest};
use crate::integrity::{IntegrityReport, check_integrity};
use crate::memory::retrieval::{RecallHit, RecallMode, RecallOutcome, Retriever};
use crate::memory::types::{Agent, Impact, LinkType, Memory, MemoryKind, MemoryLink, Project, Region};
use crate::memory::{infer_impact, infer_kind, infer_region};
use crate::signing::{HmacSigner, Signer};
use crate::storage::{MemoryFilter, SqliteStore};

/// Settings key holding the current session id
pub const SESSION_KEY: &str = "current_session_id";

/// A memory to be remembered. Unset metadata is inferred from the text.
#[derive(Debug, Clone, Default)]
pub struct NewMemory {
    pub content: String,
    pub kind: Option<MemoryKind>,
    pub impact: Option<Impact>,
    pub region: Option<Region>,
    pub project: Option<Project>,
    pub platform: Option<String>,
    pub git_commit: Option<String>,
    pub git_branch: Option<String>,
}

impl NewMemory {
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            ..Self::default()
        }
    }

    pub fn kind(mut self, kind: MemoryKind) -> Self {
        self.kind = Some(kind);
        self
    }

    pub fn impact(mut self, impact: Impact) -> Self {
        self.impact = Some(impact);
        self
    }

    pub fn region(mut self, region: Region) -> Self {
        self.region = Some(region);
        self
    }

    /// Project the caller is working in; PROJECT memories are stored here
    pub fn in_project(mut self, project: Project) -> Self {
        self.project = Some(project);
        self
    }

    pub fn platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = Some(platform.into());
        self
    }

    pub fn git(mut self, commit: Option<String>, branch: Option<String>) -> Self {
        self.git_commit = commit;
        self.git_branch = branch;
        self
    }
}

/// Result of remember/supersede
#[derive(Debug, Clone, Serialize)]
pub struct Remembered {
    pub memory: Memory,
    pub links: LinkReport,
    /// The memory was stored without an embedding
    pub degraded: bool,
}

/// Recall request: free text, or a specific id
#[derive(Debug, Clone)]
pub struct RecallQuery {
    pub text: Option<String>,
    pub id: Option<String>,
    pub semantic: bool,
    pub limit: Option<usize>,
    pub project: Option<Project>,
    pub kinds: Vec<MemoryKind>,
}

impl RecallQuery {
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            id: None,
            semantic: true,
            limit: None,
            project: None,
            kinds: Vec::new(),
        }
    }

    pub fn id(id_or_prefix: impl Into<String>) -> Self {
        Self {
            text: None,
            id: Some(id_or_prefix.into()),
            ..Self::text("")
        }
    }

    pub fn keyword_only(mut self) -> Self {
        self.semantic = false;
        self
    }

    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn in_project(mut self, project: Option<Project>) -> Self {
        self.project = project;
        self
    }

    pub fn with_kinds(mut self, kinds: Vec<MemoryKind>) -> Self {
        self.kinds = kinds;
        self
    }
}

/// A commit reported by an external achievement detector
#[derive(Debug, Clone)]
pub struct AchievementCandidate {
    pub commit: String,
    pub branch: Option<String>,
    pub summary: String,
    pub impact: Impact,
}

/// The memory engine for one primary agent
pub struct Engine {
    store: SqliteStore,
    config: Config,
    agent: Agent,
    /// Uninitialized means "load the configured model on first use"
    embedder: OnceCell<Option<Box<dyn Embedder>>>,
    signer: Option<Box<dyn Signer>>,
}

impl Engine {
    /// Open the configured database. The embedding model is loaded lazily
    /// the first time an operation needs it, and the signing key is read
    /// from the configured environment variable.
    pub fn open(config: Config) -> Result<Self> {
        if config.embedding.enabled && config.embedding.model != DEFAULT_MODEL_TAG {
            return Err(LtmError::Config(format!(
                "unsupported embedding model '{}', only '{}' is available",
                config.embedding.model, DEFAULT_MODEL_TAG
            )));
        }
        let store = SqliteStore::open(&config.storage.db_path)?;
        let signer = HmacSigner::from_env(&config.signing.key_env)
            .map(|s| Box::new(s) as Box<dyn Signer>);
        if signer.is_none() {
            tracing::debug!("No signing key in ${}, memories stay unsigned", config.signing.key_env);
        }
        let mut engine = Self::new(store, config);
        engine.embedder = OnceCell::new();
        engine.signer = signer;
        Ok(engine)
    }

    /// Wrap an existing store. No embedder or signer is attached.
    pub fn new(store: SqliteStore, config: Config) -> Self {
        let agent = Agent::new(config.agent.id.clone(), config.agent.name.clone());
        Self {
            store,
            config,
            agent,
            embedder: OnceCell::from(None),
            signer: None,
        }
    }

    pub fn with_embedder(mut self, embedder: Box<dyn Embedder>) -> Self {
        self.embedder = OnceCell::from(Some(embedder));
        self
    }

    /// Keyword-only mode
    pub fn without_embedder(mut self) -> Self {
        self.embedder = OnceCell::from(None);
        self
    }

    pub fn with_signer(mut self, signer: Box<dyn Signer>) -> Self {
        self.signer = Some(signer);
        self
    }

    pub fn with_agent(mut self, agent: Agent) -> Self {
        self.agent = agent;
        self
    }

    pub fn store(&self) -> &SqliteStore {
        &self.store
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn agent(&self) -> &Agent {
        &self.agent
    }

    fn embedder(&self) -> Option<&dyn Embedder> {
        self.embedder
            .get_or_init(|| {
                if !self.config.embedding.enabled {
                    return None;
                }
                match FastEmbedder::new() {
                    Ok(embedder) => Some(Box::new(embedder) as Box<dyn Embedder>),
                    Err(e) => {
                        tracing::warn!("{}; continuing without embeddings", e);
                        None
                    }
                }
            })
            .as_deref()
    }

    fn signer(&self) -> Option<&dyn Signer> {
        self.signer.as_deref()
    }

    // ---- projects -------------------------------------------------------

    /// Project registered for `path`, registering it on first sight
    pub fn resolve_project(&self, path: &Path) -> Result<Project> {
        self.store.ensure_project(path)
    }

    /// Refuse to act when the caller names a project other than the one
    /// resolved from its working directory.
    pub fn check_project(&self, declared: &str, resolved: &Project) -> Result<()> {
        if declared != resolved.name {
            return Err(LtmError::ProjectMismatch {
                declared: declared.to_string(),
                resolved: resolved.name.clone(),
            });
        }
        Ok(())
    }

    // ---- sessions -------------------------------------------------------

    /// Start a new session and return its id (`YYYYMMDD-HHMMSS-xxxxxxxx`)
    pub fn start_session(&self, now: DateTime<Utc>) -> Result<String> {
        let simple = Uuid::new_v4().simple().to_string();
        let id = format!("{}-{}", now.format("%Y%m%d-%H%M%S"), &simple[..8]);
        self.store.set_setting(SESSION_KEY, &id)?;
        tracing::info!("Started session {}", id);
        Ok(id)
    }

    pub fn current_session(&self) -> Result<Option<String>> {
        Ok(self
            .store
            .get_setting(SESSION_KEY)?
            .filter(|id| !id.is_empty()))
    }

    /// Run the decay pass for the agent and close the current session
    pub fn end_session(&self, project: Option<&Project>) -> Result<DecaySummary> {
        self.end_session_at(project, Utc::now())
    }

    pub fn end_session_at(&self, project: Option<&Project>, now: DateTime<Utc>) -> Result<DecaySummary> {
        let summary = DecayEngine::with_config(&self.store, self.config.decay.clone()).run(
            &self.agent.id,
            project.map(|p| p.id.as_str()),
            now,
        )?;
        self.store.set_setting(SESSION_KEY, "")?;
        Ok(summary)
    }

    // ---- memories -------------------------------------------------------

    pub fn remember(&self, new: NewMemory) -> Result<Remembered> {
        self.remember_at(new, Utc::now())
    }

    /// Store a memory, sign it, embed it and link it to similar memories.
    ///
    /// An embedding failure does not fail the call; the memory is stored
    /// without a vector and `degraded` is set, so a later backfill can
    /// pick it up.
    pub fn remember_at(&self, new: NewMemory, now: DateTime<Utc>) -> Result<Remembered> {
        let content = new.content.trim();
        if content.is_empty() {
            return Err(LtmError::InvalidInput("memory content is empty".to_string()));
        }

        let kind = new.kind.unwrap_or_else(|| infer_kind(content));
        let impact = new.impact.unwrap_or_else(|| infer_impact(content));
        let region = new
            .region
            .unwrap_or_else(|| infer_region(content, new.project.is_some()));

        let mut memory = Memory::new_at(self.agent.id.clone(), kind, impact, content, now)
            .with_git(new.git_commit, new.git_branch);
        if region == Region::Project {
            let project = new.project.as_ref().ok_or(LtmError::InvalidRegion)?;
            memory = memory.in_project(project.id.clone());
        }
        if let Some(platform) = new.platform {
            memory = memory.with_platform(platform);
        }
        if let Some(session) = self.current_session()? {
            memory = memory.with_session(session);
        }
        if let Some(signer) = self.signer() {
            memory.signature = Some(signer.sign(&memory.original_content)?);
        }
        memory.token_count = line_token_count(&memory);

        let embedded = self.embed(&memory.content);
        let degraded = embedded.is_none();
        if let Some((vector, model)) = &embedded {
            memory.embedding = Some(vector.clone());
            memory.embedding_model = Some(model.clone());
        }

        let links = self.store.atomically(|store| {
            self.check_limits(&memory)?;
            store.upsert_agent(&self.agent)?;
            store.insert_memory(&memory)?;
            match &embedded {
                Some((vector, model)) => self.linker().link_new(&memory, vector, model, now),
                None => Ok(LinkReport::default()),
            }
        })?;

        tracing::info!(
            "Remembered {} ({} {} {}), {} links",
            memory.short_id(),
            memory.kind,
            memory.impact,
            memory.region,
            links.created
        );
        Ok(Remembered {
            memory,
            links,
            degraded,
        })
    }

    pub fn supersede(&self, id_or_prefix: &str, content: &str) -> Result<Remembered> {
        self.supersede_at(id_or_prefix, content, Utc::now())
    }

    /// Replace a memory's content with a new version, keeping the old row
    /// as history.
    pub fn supersede_at(&self, id_or_prefix: &str, content: &str, now: DateTime<Utc>) -> Result<Remembered> {
        let content = content.trim();
        if content.is_empty() {
            return Err(LtmError::InvalidInput("memory content is empty".to_string()));
        }
        let old_id = self.store.resolve_memory_id(id_or_prefix)?;
        let session = self.current_session()?;
        let embedded = self.embed(content);

        let (memory, links) = self.store.atomically(|store| {
            let mut memory = store.supersede(old_id, content, now)?;
            store.set_session(memory.id, session.as_deref())?;
            memory.session_id = session.clone();
            if let Some(signer) = self.signer() {
                let signature = signer.sign(&memory.original_content)?;
                store.set_signature(memory.id, &signature)?;
                memory.signature = Some(signature);
            }
            memory.token_count = line_token_count(&memory);
            store.set_token_count(memory.id, memory.token_count)?;

            let links = match &embedded {
                Some((vector, model)) => {
                    store.set_embedding(memory.id, vector, model)?;
                    memory.embedding = Some(vector.clone());
                    memory.embedding_model = Some(model.clone());
                    self.linker().link_new(&memory, vector, model, now)?
                }
                None => LinkReport::default(),
            };
            Ok((memory, links))
        })?;

        tracing::info!("Superseded {} with {} (v{})", old_id, memory.short_id(), memory.version);
        Ok(Remembered {
            degraded: embedded.is_none(),
            memory,
            links,
        })
    }

    pub fn recall(&self, query: &RecallQuery) -> Result<RecallOutcome> {
        self.recall_at(query, Utc::now())
    }

    /// Semantic recall with keyword fallback, or a direct id lookup.
    ///
    /// Returned memories are marked accessed.
    pub fn recall_at(&self, query: &RecallQuery, now: DateTime<Utc>) -> Result<RecallOutcome> {
        let mut retriever = Retriever::new(&self.store)
            .with_embedder(self.embedder())
            .with_signer(self.signer())
            .with_config(self.config.search.clone());
        if !query.semantic {
            retriever = retriever.keyword_only();
        }

        if let Some(id) = &query.id {
            let hit: RecallHit = retriever.recall_by_id(id, now)?;
            return Ok(RecallOutcome {
                hits: vec![hit],
                mode: RecallMode::Keyword,
                degraded: false,
            });
        }

        let text = query.text.as_deref().unwrap_or_default();
        let mut filter = MemoryFilter::new()
            .for_agent(&self.agent.id)
            .visible_in(query.project.as_ref().map(|p| p.id.as_str()));
        if !query.kinds.is_empty() {
            filter = filter.with_kinds(query.kinds.clone());
        }
        let limit = query.limit.unwrap_or(self.config.search.default_limit);
        retriever.recall(text, &filter, limit, now)
    }

    /// Permanently delete a memory and its links
    pub fn forget(&self, id_or_prefix: &str) -> Result<Memory> {
        let memory = self.store.forget(id_or_prefix)?;
        tracing::info!("Forgot memory {}", memory.short_id());
        Ok(memory)
    }

    /// Record an explicit typed link between two memories
    pub fn link(&self, source: &str, target: &str, link_type: LinkType) -> Result<MemoryLink> {
        let source_id = self.store.resolve_memory_id(source)?;
        let target_id = self.store.resolve_memory_id(target)?;
        if source_id == target_id {
            return Err(LtmError::InvalidInput("cannot link a memory to itself".to_string()));
        }
        let link = MemoryLink {
            source_id,
            target_id,
            link_type,
            similarity: None,
            created_at: Utc::now(),
        };
        self.store.put_link(&link)?;
        Ok(link)
    }

    pub fn linked_memories(
        &self,
        id_or_prefix: &str,
        max_depth: usize,
        link_types: Option<&[LinkType]>,
    ) -> Result<Vec<LinkedMemory>> {
        let id = self.store.resolve_memory_id(id_or_prefix)?;
        linked_memories(&self.store, id, max_depth, link_types)
    }

    pub fn supersession_chain(&self, id_or_prefix: &str) -> Result<Vec<Memory>> {
        let id = self.store.resolve_memory_id(id_or_prefix)?;
        supersession_chain(&self.store, id)
    }

    /// Current memories recorded at a commit (prefix match)
    pub fn memories_by_commit(&self, commit_prefix: &str) -> Result<Vec<Memory>> {
        self.store.query(
            &MemoryFilter::new()
                .for_agent(&self.agent.id)
                .with_commit_prefix(commit_prefix),
        )
    }

    /// Current memories recorded during a session
    pub fn memories_by_session(&self, session_id: &str) -> Result<Vec<Memory>> {
        self.store.query(
            &MemoryFilter::new()
                .for_agent(&self.agent.id)
                .with_session(session_id),
        )
    }

    /// Insert ACHIEVEMENTS memories for detected commits, skipping commits
    /// already recorded for this agent and project.
    pub fn import_achievements(
        &self,
        candidates: &[AchievementCandidate],
        project: Option<&Project>,
    ) -> Result<Vec<Memory>> {
        let mut imported = Vec::new();
        for candidate in candidates {
            let project_id = project.map(|p| p.id.as_str());
            if self
                .store
                .find_by_commit(&self.agent.id, project_id, &candidate.commit)?
                .is_some()
            {
                tracing::debug!("Achievement for {} already recorded", candidate.commit);
                continue;
            }
            let mut new = NewMemory::new(&candidate.summary)
                .kind(MemoryKind::Achievements)
                .impact(candidate.impact)
                .git(Some(candidate.commit.clone()), candidate.branch.clone());
            new = match project {
                Some(project) => new.region(Region::Project).in_project(project.clone()),
                None => new.region(Region::Agent),
            };
            imported.push(self.remember(new)?.memory);
        }
        Ok(imported)
    }

    // ---- context --------------------------------------------------------

    /// Assemble the context block for the agent (or for `subagent`, with
    /// the agent's CORE memories inherited).
    pub fn load_context(
        &self,
        project: Option<&Project>,
        subagent: Option<&Agent>,
        budget: Option<Budget>,
    ) -> Result<AssembledContext> {
        let budget = budget.unwrap_or_else(|| Budget::from(&self.config.budget));
        let request = self.context_request(project, subagent, budget);
        ContextAssembler::new(&self.store)
            .with_signer(self.signer())
            .assemble(&request)
    }

    /// Drain what the last `load_context` deferred; empty when nothing is left
    pub fn load_deferred(&self, project: Option<&Project>, subagent: Option<&Agent>) -> Result<String> {
        let request = self.context_request(project, subagent, Budget::Tokens(0));
        ContextAssembler::new(&self.store)
            .with_signer(self.signer())
            .drain_deferred(&request)
    }

    fn context_request(&self, project: Option<&Project>, subagent: Option<&Agent>, budget: Budget) -> ContextRequest {
        let request = match subagent {
            Some(sub) => ContextRequest::new(sub.clone(), budget).as_subagent_of(self.agent.clone()),
            None => ContextRequest::new(self.agent.clone(), budget),
        };
        request.in_project(project.cloned())
    }

    // ---- curiosity ------------------------------------------------------

    fn curiosity(&self) -> CuriosityQueue<'_> {
        CuriosityQueue::with_config(&self.store, self.config.curiosity.clone())
    }

    /// Queue a question, or bump the recurrence of a matching open one
    pub fn curious(
        &self,
        question: &str,
        region: Region,
        context: Option<&str>,
        project: Option<&Project>,
    ) -> Result<CuriosityItem> {
        self.curiosity().add(
            &self.agent.id,
            question,
            context,
            region,
            project.map(|p| p.id.as_str()),
            Utc::now(),
        )
    }

    /// The highest-priority open question; it stays open
    pub fn research_pop(&self, project: Option<&Project>) -> Result<Option<CuriosityItem>> {
        self.curiosity()
            .pop(&self.agent.id, project.map(|p| p.id.as_str()), Utc::now())
    }

    pub fn curiosity_list(&self, filter: &CuriosityFilter) -> Result<Vec<CuriosityItem>> {
        self.curiosity().list(filter, Utc::now())
    }

    /// Priority of an item as of now
    pub fn curiosity_priority(&self, item: &CuriosityItem) -> i64 {
        self.curiosity().priority(item, Utc::now())
    }

    pub fn complete_research(&self, id_or_prefix: &str) -> Result<CuriosityItem> {
        self.curiosity().complete(id_or_prefix)
    }

    pub fn dismiss_research(&self, id_or_prefix: &str) -> Result<CuriosityItem> {
        self.curiosity().dismiss(id_or_prefix)
    }

    pub fn boost_research(&self, id_or_prefix: &str, amount: i64) -> Result<CuriosityItem> {
        self.curiosity().boost(id_or_prefix, amount)
    }

    pub fn last_research(&self) -> Result<Option<DateTime<Utc>>> {
        self.curiosity().last_research()
    }

    // ---- dissonance -----------------------------------------------------

    fn dissonance(&self) -> DissonanceQueue<'_> {
        DissonanceQueue::new(&self.store)
    }

    /// Queue a contradiction between two memories for human resolution
    pub fn add_dissonance(&self, memory_a: &str, memory_b: &str, description: &str) -> Result<Dissonance> {
        self.dissonance()
            .add(&self.agent.id, memory_a, memory_b, description, Utc::now())
    }

    pub fn dissonances(&self, include_closed: bool) -> Result<Vec<Dissonance>> {
        self.dissonance().list(&self.agent.id, include_closed)
    }

    pub fn count_open_dissonances(&self) -> Result<usize> {
        self.dissonance().count_open(&self.agent.id)
    }

    pub fn show_dissonance(&self, id_or_prefix: &str) -> Result<DissonanceDetail> {
        self.dissonance().show(id_or_prefix)
    }

    pub fn resolve_dissonance(&self, id_or_prefix: &str, resolution: &str) -> Result<Dissonance> {
        self.dissonance().resolve(id_or_prefix, resolution, Utc::now())
    }

    pub fn dismiss_dissonance(&self, id_or_prefix: &str) -> Result<Dissonance> {
        self.dissonance().dismiss(id_or_prefix, Utc::now())
    }

    // ---- maintenance ----------------------------------------------------

    /// Embed and link rows stored without an embedding
    pub fn backfill(&self, batch_size: Option<usize>, dry_run: bool) -> Result<BackfillReport> {
        let batch_size = batch_size.unwrap_or(self.config.embedding.batch_size);
        match self.embedder() {
            Some(embedder) => backfill_embeddings(
                &self.store,
                embedder,
                &self.config.linking,
                batch_size,
                dry_run,
                Utc::now(),
            ),
            None => {
                let pending = self.store.count_missing_embeddings()?;
                tracing::warn!("Backfill skipped: no embedder available ({} pending)", pending);
                Ok(BackfillReport {
                    pending,
                    failed: if dry_run { 0 } else { pending },
                    dry_run,
                    ..BackfillReport::default()
                })
            }
        }
    }

    pub fn check_integrity(&self, project: Option<&Project>) -> Result<IntegrityReport> {
        check_integrity(
            &self.store,
            &self.agent.id,
            project.map(|p| p.id.as_str()),
            self.signer(),
        )
    }

    fn embed(&self, text: &str) -> Option<(Vec<f32>, String)> {
        let embedder = self.embedder()?;
        match embedder.embed(text) {
            Ok(vector) => Some((vector, embedder.model_tag().to_string())),
            Err(e) => {
                tracing::warn!("Storing memory without embedding: {}", e);
                None
            }
        }
    }

    fn linker(&self) -> Linker<'_> {
        Linker::new(&self.store, self.config.linking.clone())
    }

    fn check_limits(&self, memory: &Memory) -> Result<()> {
        let limits = &self.config.limits;
        let base = MemoryFilter::new().for_agent(&memory.agent_id);

        let mut checks = vec![(format!("agent {}", memory.agent_id), base.clone(), limits.max_per_agent)];
        if let Some(project_id) = &memory.project_id {
            checks.push((
                format!("project {project_id}"),
                base.clone().with_project(project_id.clone()),
                limits.max_per_project,
            ));
        }
        checks.push((
            format!("kind {}", memory.kind),
            base.with_kinds(vec![memory.kind]),
            limits.max_per_kind,
        ));

        for (scope, filter, limit) in checks {
            let Some(limit) = limit else {
                continue;
            };
            let current = self.store.count(&filter)?;
            if current >= limit {
                return Err(LtmError::LimitExceeded {
                    scope,
                    current,
                    limit,
                });
            }
        }
        Ok(())
    }
}
