//! SQLite schema definition

/// SQL schema for the kbstore database
pub const SCHEMA_SQL: &str = r#"
-- Knowledge bases: owned document collections with rolled-up statistics
CREATE TABLE IF NOT EXISTS knowledge_bases (
    id TEXT PRIMARY KEY,
    owner_id TEXT NOT NULL,
    name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    embedding_model TEXT NOT NULL,
    embedding_dimension INTEGER NOT NULL CHECK (embedding_dimension > 0),
    chunk_size INTEGER NOT NULL CHECK (chunk_size BETWEEN 100 AND 8000),
    chunk_overlap INTEGER NOT NULL CHECK (chunk_overlap BETWEEN 0 AND 500),
    vector_store_type TEXT NOT NULL,
    is_public INTEGER NOT NULL DEFAULT 0,
    document_count INTEGER NOT NULL DEFAULT 0 CHECK (document_count >= 0),
    chunk_count INTEGER NOT NULL DEFAULT 0 CHECK (chunk_count >= 0),
    total_tokens INTEGER NOT NULL DEFAULT 0 CHECK (total_tokens >= 0),
    avg_chunk_quality REAL NOT NULL DEFAULT 0.0 CHECK (avg_chunk_quality BETWEEN 0.0 AND 1.0),
    last_indexed_at TEXT,
    metadata_json TEXT NOT NULL DEFAULT '{}',
    status TEXT NOT NULL DEFAULT 'pending',
    status_message TEXT NOT NULL DEFAULT '',
    processing_started_at TEXT,
    processing_completed_at TEXT,
    is_deleted INTEGER NOT NULL DEFAULT 0,
    deleted_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Users a knowledge base is shared with
CREATE TABLE IF NOT EXISTS kb_shares (
    knowledge_base_id TEXT NOT NULL REFERENCES knowledge_bases(id) ON DELETE CASCADE,
    user_id TEXT NOT NULL,
    created_at TEXT NOT NULL,
    PRIMARY KEY (knowledge_base_id, user_id)
);

-- Version snapshots of knowledge bases
CREATE TABLE IF NOT EXISTS kb_versions (
    id TEXT PRIMARY KEY,
    knowledge_base_id TEXT NOT NULL REFERENCES knowledge_bases(id) ON DELETE CASCADE,
    version INTEGER NOT NULL CHECK (version > 0),
    is_active INTEGER NOT NULL DEFAULT 1,
    name TEXT NOT NULL,
    description TEXT NOT NULL DEFAULT '',
    changes TEXT NOT NULL DEFAULT '',
    document_count_snapshot INTEGER NOT NULL DEFAULT 0,
    chunk_count_snapshot INTEGER NOT NULL DEFAULT 0,
    created_by TEXT,
    metadata_json TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE(knowledge_base_id, version)
);

-- Tags: uniquely named labels with a display color
CREATE TABLE IF NOT EXISTS kb_tags (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    color TEXT NOT NULL DEFAULT '#007bff',
    created_at TEXT NOT NULL
);

-- Knowledge base <-> tag links
CREATE TABLE IF NOT EXISTS kb_tag_relations (
    knowledge_base_id TEXT NOT NULL REFERENCES knowledge_bases(id) ON DELETE CASCADE,
    tag_id TEXT NOT NULL REFERENCES kb_tags(id) ON DELETE CASCADE,
    created_at TEXT NOT NULL,
    PRIMARY KEY (knowledge_base_id, tag_id)
);

-- Access log for analytics
CREATE TABLE IF NOT EXISTS kb_access_log (
    id TEXT PRIMARY KEY,
    knowledge_base_id TEXT NOT NULL REFERENCES knowledge_bases(id) ON DELETE CASCADE,
    user_id TEXT NOT NULL,
    access_type TEXT NOT NULL CHECK (access_type IN ('view', 'search', 'query', 'edit', 'delete')),
    ip_address TEXT,
    user_agent TEXT NOT NULL DEFAULT '',
    created_at TEXT NOT NULL
);

-- Documents: uploaded content of a knowledge base
CREATE TABLE IF NOT EXISTS documents (
    id TEXT PRIMARY KEY,
    knowledge_base_id TEXT NOT NULL REFERENCES knowledge_bases(id) ON DELETE CASCADE,
    title TEXT NOT NULL,
    content TEXT NOT NULL DEFAULT '',
    file_path TEXT,
    file_type TEXT NOT NULL DEFAULT '',
    file_size INTEGER NOT NULL DEFAULT 0 CHECK (file_size >= 0),
    mime_type TEXT NOT NULL DEFAULT '',
    char_count INTEGER NOT NULL DEFAULT 0 CHECK (char_count >= 0),
    word_count INTEGER NOT NULL DEFAULT 0 CHECK (word_count >= 0),
    token_count INTEGER NOT NULL DEFAULT 0 CHECK (token_count >= 0),
    language TEXT NOT NULL DEFAULT 'en',
    quality_score REAL NOT NULL DEFAULT 0.0 CHECK (quality_score BETWEEN 0.0 AND 1.0),
    chunk_count INTEGER NOT NULL DEFAULT 0 CHECK (chunk_count >= 0),
    uploaded_by TEXT,
    metadata_json TEXT NOT NULL DEFAULT '{}',
    status TEXT NOT NULL DEFAULT 'pending',
    status_message TEXT NOT NULL DEFAULT '',
    processing_started_at TEXT,
    processing_completed_at TEXT,
    is_deleted INTEGER NOT NULL DEFAULT 0,
    deleted_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Chunks: positioned slices of a document
CREATE TABLE IF NOT EXISTS document_chunks (
    id TEXT PRIMARY KEY,
    document_id TEXT NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
    content TEXT NOT NULL,
    chunk_index INTEGER NOT NULL CHECK (chunk_index >= 0),
    start_char INTEGER NOT NULL DEFAULT 0 CHECK (start_char >= 0),
    end_char INTEGER NOT NULL DEFAULT 0,
    char_count INTEGER NOT NULL DEFAULT 0,
    word_count INTEGER NOT NULL DEFAULT 0,
    token_count INTEGER NOT NULL DEFAULT 0,
    quality_score REAL NOT NULL DEFAULT 0.0 CHECK (quality_score BETWEEN 0.0 AND 1.0),
    coherence_score REAL NOT NULL DEFAULT 0.0 CHECK (coherence_score BETWEEN 0.0 AND 1.0),
    is_embedded INTEGER NOT NULL DEFAULT 0,
    embedding_model TEXT NOT NULL DEFAULT '',
    summary TEXT NOT NULL DEFAULT '',
    keywords_json TEXT NOT NULL DEFAULT '[]',
    entities_json TEXT NOT NULL DEFAULT '[]',
    metadata_json TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    CHECK (start_char <= end_char),
    UNIQUE(document_id, chunk_index)
);

-- Embedding models: shared, long-lived configuration
CREATE TABLE IF NOT EXISTS embedding_models (
    id TEXT PRIMARY KEY,
    name TEXT NOT NULL UNIQUE,
    provider TEXT NOT NULL,
    model_id TEXT NOT NULL,
    dimension INTEGER NOT NULL CHECK (dimension > 0),
    max_tokens INTEGER NOT NULL DEFAULT 512,
    description TEXT NOT NULL DEFAULT '',
    is_active INTEGER NOT NULL DEFAULT 1,
    avg_processing_time REAL NOT NULL DEFAULT 0.0,
    usage_count INTEGER NOT NULL DEFAULT 0 CHECK (usage_count >= 0),
    config_json TEXT NOT NULL DEFAULT '{}',
    metadata_json TEXT NOT NULL DEFAULT '{}',
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Document embeddings: one vector per (document, chunk, model)
CREATE TABLE IF NOT EXISTS document_embeddings (
    id TEXT PRIMARY KEY,
    document_id TEXT NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
    chunk_index INTEGER NOT NULL,
    embedding_model_id TEXT NOT NULL REFERENCES embedding_models(id) ON DELETE RESTRICT,
    text_content TEXT NOT NULL,
    embedding_vector BLOB NOT NULL,
    chunk_metadata_json TEXT NOT NULL DEFAULT '{}',
    processing_time REAL,
    token_count INTEGER,
    status TEXT NOT NULL DEFAULT 'pending',
    status_message TEXT NOT NULL DEFAULT '',
    processing_started_at TEXT,
    processing_completed_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE(document_id, chunk_index, embedding_model_id)
);

-- Query embedding cache
CREATE TABLE IF NOT EXISTS query_embeddings (
    id TEXT PRIMARY KEY,
    query_text TEXT NOT NULL,
    query_hash TEXT NOT NULL,
    embedding_model_id TEXT NOT NULL REFERENCES embedding_models(id) ON DELETE RESTRICT,
    embedding_vector BLOB NOT NULL,
    hit_count INTEGER NOT NULL DEFAULT 1 CHECK (hit_count >= 0),
    last_used TEXT NOT NULL,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    UNIQUE(query_hash, embedding_model_id)
);

-- Embedding jobs: batch work with per-item counters
CREATE TABLE IF NOT EXISTS embedding_jobs (
    id TEXT PRIMARY KEY,
    job_type TEXT NOT NULL,
    embedding_model_id TEXT NOT NULL REFERENCES embedding_models(id) ON DELETE RESTRICT,
    parameters_json TEXT NOT NULL DEFAULT '{}',
    total_items INTEGER NOT NULL DEFAULT 0 CHECK (total_items >= 0),
    processed_items INTEGER NOT NULL DEFAULT 0 CHECK (processed_items >= 0),
    failed_items INTEGER NOT NULL DEFAULT 0 CHECK (failed_items >= 0),
    result_data_json TEXT NOT NULL DEFAULT '{}',
    status TEXT NOT NULL DEFAULT 'pending',
    status_message TEXT NOT NULL DEFAULT '',
    processing_started_at TEXT,
    processing_completed_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL,
    CHECK (processed_items + failed_items <= total_items)
);

-- Per-document processing tasks
CREATE TABLE IF NOT EXISTS processing_tasks (
    id TEXT PRIMARY KEY,
    document_id TEXT NOT NULL REFERENCES documents(id) ON DELETE CASCADE,
    task_type TEXT NOT NULL,
    task_id TEXT NOT NULL DEFAULT '',
    progress REAL NOT NULL DEFAULT 0.0 CHECK (progress BETWEEN 0.0 AND 1.0),
    result_json TEXT NOT NULL DEFAULT '{}',
    error_details TEXT NOT NULL DEFAULT '',
    status TEXT NOT NULL DEFAULT 'pending',
    status_message TEXT NOT NULL DEFAULT '',
    processing_started_at TEXT,
    processing_completed_at TEXT,
    created_at TEXT NOT NULL,
    updated_at TEXT NOT NULL
);

-- Indexes for performance
CREATE INDEX IF NOT EXISTS idx_kb_owner ON knowledge_bases(owner_id, is_public);
CREATE INDEX IF NOT EXISTS idx_kb_status ON knowledge_bases(status);
CREATE INDEX IF NOT EXISTS idx_tag_relations_tag ON kb_tag_relations(tag_id);
CREATE INDEX IF NOT EXISTS idx_access_kb_time ON kb_access_log(knowledge_base_id, created_at);
CREATE INDEX IF NOT EXISTS idx_access_user_time ON kb_access_log(user_id, created_at);
CREATE INDEX IF NOT EXISTS idx_documents_kb ON documents(knowledge_base_id, status);
CREATE INDEX IF NOT EXISTS idx_documents_file_type ON documents(file_type);
CREATE INDEX IF NOT EXISTS idx_chunks_embedded ON document_chunks(is_embedded);
CREATE INDEX IF NOT EXISTS idx_chunks_quality ON document_chunks(quality_score);
CREATE INDEX IF NOT EXISTS idx_embeddings_doc_model ON document_embeddings(document_id, embedding_model_id);
CREATE INDEX IF NOT EXISTS idx_query_cache_model_used ON query_embeddings(embedding_model_id, last_used);
CREATE INDEX IF NOT EXISTS idx_jobs_status ON embedding_jobs(status);
CREATE INDEX IF NOT EXISTS idx_tasks_doc_type ON processing_tasks(document_id, task_type);
"#;
