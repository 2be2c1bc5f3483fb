//! SQLite schema for the memory store

/// Bumped whenever the DDL below changes shape
pub const SCHEMA_VERSION: i64 = 2;

pub const SCHEMA: &str = r#"
CREATE TABLE IF NOT EXISTS agents (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    definition_path TEXT,
    signing_key_ref TEXT,
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS projects (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL,
    path TEXT NOT NULL UNIQUE,
    created_at INTEGER NOT NULL
);

CREATE TABLE IF NOT EXISTS memories (
    id TEXT PRIMARY KEY,
    agent_id TEXT NOT NULL,
    region TEXT NOT NULL CHECK (region IN ('AGENT', 'PROJECT')),
    project_id TEXT,
    kind TEXT NOT NULL,
    content TEXT NOT NULL,
    original_content TEXT NOT NULL,
    impact TEXT NOT NULL,
    confidence REAL NOT NULL DEFAULT 1.0,
    created_at INTEGER NOT NULL,
    last_accessed INTEGER NOT NULL,
    previous_memory_id TEXT REFERENCES memories(id) ON DELETE SET NULL,
    superseded_by TEXT REFERENCES memories(id) ON DELETE SET NULL,
    version INTEGER NOT NULL DEFAULT 1,
    signature TEXT,
    token_count INTEGER NOT NULL DEFAULT 0,
    platform TEXT,
    embedding BLOB,
    embedding_model TEXT,
    tier TEXT NOT NULL DEFAULT 'CONTEXTUAL',
    compaction TEXT NOT NULL DEFAULT 'FULL',
    session_id TEXT,
    git_commit TEXT,
    git_branch TEXT,
    CHECK (region = 'AGENT' OR project_id IS NOT NULL)
);

CREATE INDEX IF NOT EXISTS idx_memories_agent_region ON memories(agent_id, region);
CREATE INDEX IF NOT EXISTS idx_memories_project ON memories(project_id);
CREATE INDEX IF NOT EXISTS idx_memories_kind ON memories(kind);
CREATE INDEX IF NOT EXISTS idx_memories_impact ON memories(impact);
CREATE INDEX IF NOT EXISTS idx_memories_tier ON memories(tier);
CREATE INDEX IF NOT EXISTS idx_memories_created ON memories(created_at);
CREATE INDEX IF NOT EXISTS idx_memories_superseded ON memories(superseded_by);
CREATE INDEX IF NOT EXISTS idx_memories_commit ON memories(git_commit);
CREATE INDEX IF NOT EXISTS idx_memories_session ON memories(session_id);

CREATE TABLE IF NOT EXISTS memory_links (
    source_id TEXT NOT NULL REFERENCES memories(id) ON DELETE CASCADE,
    target_id TEXT NOT NULL REFERENCES memories(id) ON DELETE CASCADE,
    link_type TEXT NOT NULL,
    similarity REAL,
    created_at INTEGER NOT NULL,
    PRIMARY KEY (source_id, target_id)
);

CREATE INDEX IF NOT EXISTS idx_links_source ON memory_links(source_id);
CREATE INDEX IF NOT EXISTS idx_links_target ON memory_links(target_id);

CREATE TABLE IF NOT EXISTS curiosity_queue (
    id TEXT PRIMARY KEY,
    agent_id TEXT NOT NULL,
    region TEXT NOT NULL CHECK (region IN ('AGENT', 'PROJECT')),
    project_id TEXT,
    question TEXT NOT NULL,
    context TEXT,
    recurrence_count INTEGER NOT NULL DEFAULT 1 CHECK (recurrence_count >= 1),
    first_seen INTEGER NOT NULL,
    last_seen INTEGER NOT NULL,
    status TEXT NOT NULL DEFAULT 'OPEN',
    priority_boost INTEGER NOT NULL DEFAULT 0,
    CHECK (region = 'AGENT' OR project_id IS NOT NULL)
);

CREATE INDEX IF NOT EXISTS idx_curiosity_agent_status ON curiosity_queue(agent_id, status);
CREATE INDEX IF NOT EXISTS idx_curiosity_project ON curiosity_queue(project_id);

CREATE TABLE IF NOT EXISTS dissonance_queue (
    id TEXT PRIMARY KEY,
    agent_id TEXT NOT NULL,
    memory_a TEXT NOT NULL,
    memory_b TEXT NOT NULL,
    description TEXT NOT NULL,
    detected_at INTEGER NOT NULL,
    resolved_at INTEGER,
    resolution TEXT,
    status TEXT NOT NULL DEFAULT 'OPEN'
);

CREATE INDEX IF NOT EXISTS idx_dissonance_agent_status ON dissonance_queue(agent_id, status);

CREATE TABLE IF NOT EXISTS deferred_context (
    agent_id TEXT NOT NULL,
    project_key TEXT NOT NULL,
    position INTEGER NOT NULL,
    memory_id TEXT NOT NULL REFERENCES memories(id) ON DELETE CASCADE,
    PRIMARY KEY (agent_id, project_key, position)
);

CREATE TABLE IF NOT EXISTS settings (
    key TEXT PRIMARY KEY,
    value TEXT NOT NULL
);
"#;
