//! Sistema de migrações para banco de dados
//!
//! Este módulo gerencia as migrações do banco de dados SQLite. A versão
//! aplicada fica em `PRAGMA user_version`.

use anyhow::{Context, Result};
use sqlx::{Executor, SqlitePool};
use tracing::{error, info};

/// Lista de migrações SQL a serem aplicadas
const MIGRATIONS: &[&str] = &[
    // 001_cadastro_e_saude.sql
    r#"
    -- Cidadãos; identificadores pessoais cifrados (AES-256-GCM)
    CREATE TABLE IF NOT EXISTS cidadaos (
        id TEXT PRIMARY KEY NOT NULL,
        nome TEXT NOT NULL,
        cpf_indice TEXT NOT NULL UNIQUE,
        cpf_ciphertext BLOB NOT NULL,
        cpf_nonce BLOB NOT NULL,
        data_nascimento DATE NOT NULL,
        sexo TEXT NOT NULL CHECK (sexo IN ('M', 'F', 'O')),
        estado_civil TEXT NOT NULL CHECK (estado_civil IN ('S', 'C', 'D', 'V', 'U')),
        telefone_ciphertext BLOB NOT NULL,
        telefone_nonce BLOB NOT NULL,
        email_ciphertext BLOB,
        email_nonce BLOB,
        endereco_ciphertext BLOB NOT NULL,
        endereco_nonce BLOB NOT NULL,
        cep TEXT NOT NULL,
        bairro TEXT NOT NULL,
        cidade TEXT NOT NULL,
        estado TEXT NOT NULL,
        latitude REAL,
        longitude REAL,
        endereco_capturado_automaticamente BOOLEAN NOT NULL DEFAULT 0,
        profissao TEXT NOT NULL DEFAULT '',
        renda_familiar REAL,
        possui_plano_saude BOOLEAN NOT NULL DEFAULT 0,
        hipertensao BOOLEAN NOT NULL DEFAULT 0,
        diabetes BOOLEAN NOT NULL DEFAULT 0,
        doenca_cardiaca BOOLEAN NOT NULL DEFAULT 0,
        doenca_renal BOOLEAN NOT NULL DEFAULT 0,
        asma BOOLEAN NOT NULL DEFAULT 0,
        depressao BOOLEAN NOT NULL DEFAULT 0,
        medicamentos_continuo TEXT NOT NULL DEFAULT '',
        alergias_conhecidas TEXT NOT NULL DEFAULT '',
        cirurgias_anteriores TEXT NOT NULL DEFAULT '',
        criado_em TIMESTAMP NOT NULL,
        atualizado_em TIMESTAMP NOT NULL,
        ativo BOOLEAN NOT NULL DEFAULT 1
    );

    -- Coletas de sinais vitais
    CREATE TABLE IF NOT EXISTS dados_saude (
        id TEXT PRIMARY KEY NOT NULL,
        cidadao_id TEXT NOT NULL,
        agente_coleta TEXT,
        pressao_sistolica INTEGER NOT NULL CHECK (pressao_sistolica BETWEEN 70 AND 250),
        pressao_diastolica INTEGER NOT NULL CHECK (pressao_diastolica BETWEEN 40 AND 150),
        frequencia_cardiaca INTEGER NOT NULL CHECK (frequencia_cardiaca BETWEEN 30 AND 220),
        temperatura REAL NOT NULL CHECK (temperatura BETWEEN 30 AND 45),
        peso REAL NOT NULL CHECK (peso BETWEEN 1 AND 300),
        altura REAL NOT NULL CHECK (altura BETWEEN 0.3 AND 2.5),
        sintomas_principais TEXT NOT NULL DEFAULT '',
        nivel_dor INTEGER NOT NULL DEFAULT 0 CHECK (nivel_dor BETWEEN 0 AND 10),
        duracao_sintomas TEXT NOT NULL DEFAULT '',
        historico_doencas TEXT NOT NULL DEFAULT '',
        medicamentos_uso TEXT NOT NULL DEFAULT '',
        alergias TEXT NOT NULL DEFAULT '',
        fumante BOOLEAN NOT NULL DEFAULT 0,
        etilista BOOLEAN NOT NULL DEFAULT 0,
        nivel_atividade_fisica TEXT NOT NULL DEFAULT 'sedentario',
        horas_sono INTEGER NOT NULL DEFAULT 8 CHECK (horas_sono BETWEEN 1 AND 24),
        alimentacao_balanceada BOOLEAN NOT NULL DEFAULT 0,
        consumo_agua_litros REAL NOT NULL DEFAULT 2.0 CHECK (consumo_agua_litros BETWEEN 0.1 AND 10),
        dados_extras TEXT,
        criado_em TIMESTAMP NOT NULL,
        sincronizado BOOLEAN NOT NULL DEFAULT 0,
        FOREIGN KEY (cidadao_id) REFERENCES cidadaos (id) ON DELETE CASCADE
    );

    -- Anamneses geradas por IA
    CREATE TABLE IF NOT EXISTS anamneses (
        id TEXT PRIMARY KEY NOT NULL,
        cidadao_id TEXT NOT NULL,
        dados_saude_id TEXT NOT NULL,
        resumo_anamnese TEXT NOT NULL,
        diagnostico_clinico TEXT NOT NULL DEFAULT '',
        hipoteses_diagnosticas TEXT NOT NULL DEFAULT '[]',
        diagnostico_diferencial TEXT NOT NULL DEFAULT '[]',
        triagem_risco TEXT NOT NULL CHECK (triagem_risco IN ('baixo', 'medio', 'alto', 'critico')),
        recomendacoes TEXT NOT NULL DEFAULT '',
        exames_complementares TEXT NOT NULL DEFAULT '[]',
        modelo_ia TEXT NOT NULL,
        confianca_ia REAL,
        dados_entrada_ia TEXT NOT NULL DEFAULT '{}',
        resposta_completa_ia TEXT NOT NULL DEFAULT '{}',
        status TEXT NOT NULL CHECK (status IN ('pendente', 'aprovada', 'rejeitada', 'revisao')),
        revisado_por TEXT,
        data_revisao TIMESTAMP,
        comentarios_revisao TEXT NOT NULL DEFAULT '',
        resumo_final TEXT NOT NULL DEFAULT '',
        diagnostico_final TEXT NOT NULL DEFAULT '',
        recomendacoes_finais TEXT NOT NULL DEFAULT '',
        criado_em TIMESTAMP NOT NULL,
        FOREIGN KEY (cidadao_id) REFERENCES cidadaos (id) ON DELETE CASCADE,
        FOREIGN KEY (dados_saude_id) REFERENCES dados_saude (id) ON DELETE CASCADE
    );

    -- Alertas clínicos
    CREATE TABLE IF NOT EXISTS alertas_saude (
        id TEXT PRIMARY KEY NOT NULL,
        cidadao_id TEXT NOT NULL,
        anamnese_id TEXT,
        dados_saude_id TEXT,
        tipo TEXT NOT NULL CHECK (tipo IN ('risco_alto', 'sintoma_grave', 'medicacao', 'acompanhamento')),
        prioridade TEXT NOT NULL CHECK (prioridade IN ('baixa', 'media', 'alta', 'urgente')),
        titulo TEXT NOT NULL,
        descricao TEXT NOT NULL,
        acao_recomendada TEXT NOT NULL DEFAULT '',
        prazo_acao TIMESTAMP,
        visualizado BOOLEAN NOT NULL DEFAULT 0,
        resolvido BOOLEAN NOT NULL DEFAULT 0,
        resolvido_por TEXT,
        data_resolucao TIMESTAMP,
        criado_em TIMESTAMP NOT NULL,
        FOREIGN KEY (cidadao_id) REFERENCES cidadaos (id) ON DELETE CASCADE,
        FOREIGN KEY (anamnese_id) REFERENCES anamneses (id) ON DELETE SET NULL,
        FOREIGN KEY (dados_saude_id) REFERENCES dados_saude (id) ON DELETE SET NULL
    );

    -- Pontos do mapa de risco; uma localização por cidadão
    CREATE TABLE IF NOT EXISTS localizacoes_saude (
        id TEXT PRIMARY KEY NOT NULL,
        cidadao_id TEXT NOT NULL UNIQUE,
        dados_saude_id TEXT,
        anamnese_id TEXT,
        latitude REAL NOT NULL,
        longitude REAL NOT NULL,
        endereco_completo TEXT NOT NULL DEFAULT '',
        bairro TEXT NOT NULL DEFAULT '',
        cidade TEXT NOT NULL DEFAULT '',
        estado TEXT NOT NULL DEFAULT '',
        cep TEXT NOT NULL DEFAULT '',
        nivel_risco TEXT NOT NULL CHECK (nivel_risco IN ('baixo', 'medio', 'alto', 'critico')),
        pontuacao_risco INTEGER NOT NULL DEFAULT 0,
        criado_em TIMESTAMP NOT NULL,
        atualizado_em TIMESTAMP NOT NULL,
        ativo BOOLEAN NOT NULL DEFAULT 1,
        FOREIGN KEY (cidadao_id) REFERENCES cidadaos (id) ON DELETE CASCADE,
        FOREIGN KEY (dados_saude_id) REFERENCES dados_saude (id) ON DELETE SET NULL,
        FOREIGN KEY (anamnese_id) REFERENCES anamneses (id) ON DELETE SET NULL
    );

    -- Auditoria das chamadas ao modelo de IA
    CREATE TABLE IF NOT EXISTS logs_auditoria_ia (
        id TEXT PRIMARY KEY NOT NULL,
        tipo_operacao TEXT NOT NULL,
        cidadao_id TEXT,
        anamnese_id TEXT,
        modelo_ia TEXT NOT NULL,
        prompt_enviado TEXT NOT NULL,
        dados_entrada TEXT NOT NULL DEFAULT '{}',
        resposta_ia TEXT NOT NULL DEFAULT '{}',
        tempo_processamento_ms INTEGER NOT NULL,
        sucesso BOOLEAN NOT NULL,
        erro_detalhes TEXT NOT NULL DEFAULT '',
        tokens_utilizados INTEGER,
        custo_estimado REAL,
        dados_anonimizados BOOLEAN NOT NULL DEFAULT 1,
        criado_em TIMESTAMP NOT NULL
    );

    -- Chaves mestras embrulhadas (Argon2id + ChaCha20-Poly1305)
    CREATE TABLE IF NOT EXISTS master_keys (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
        active BOOLEAN NOT NULL DEFAULT 0,
        salt BLOB NOT NULL,
        wrapped_key_ciphertext BLOB NOT NULL,
        wrapped_key_nonce BLOB NOT NULL,
        key_version INTEGER NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_cidadaos_cidade ON cidadaos (cidade);
    CREATE INDEX IF NOT EXISTS idx_cidadaos_ativo ON cidadaos (ativo);
    CREATE INDEX IF NOT EXISTS idx_dados_saude_cidadao ON dados_saude (cidadao_id, criado_em);
    CREATE INDEX IF NOT EXISTS idx_anamneses_cidadao ON anamneses (cidadao_id, criado_em);
    CREATE INDEX IF NOT EXISTS idx_anamneses_status ON anamneses (status);
    CREATE INDEX IF NOT EXISTS idx_alertas_resolvido ON alertas_saude (resolvido, prioridade);
    CREATE INDEX IF NOT EXISTS idx_localizacoes_risco ON localizacoes_saude (nivel_risco, ativo);
    CREATE INDEX IF NOT EXISTS idx_logs_ia_criado ON logs_auditoria_ia (criado_em);
    "#,
    // 002_lgpd_e_agenda.sql
    r#"
    -- Visitas domiciliares agendadas
    CREATE TABLE IF NOT EXISTS visitas_agendadas (
        id TEXT PRIMARY KEY NOT NULL,
        cidadao_id TEXT NOT NULL,
        agente TEXT NOT NULL,
        data_visita TIMESTAMP NOT NULL,
        motivo TEXT NOT NULL,
        observacoes TEXT NOT NULL DEFAULT '',
        status TEXT NOT NULL CHECK (status IN ('agendada', 'confirmada', 'realizada', 'cancelada', 'reagendada')),
        data_realizacao TIMESTAMP,
        duracao_minutos INTEGER,
        relatorio_visita TEXT NOT NULL DEFAULT '',
        notificacao_enviada BOOLEAN NOT NULL DEFAULT 0,
        lembrete_agente BOOLEAN NOT NULL DEFAULT 1,
        criado_em TIMESTAMP NOT NULL,
        atualizado_em TIMESTAMP NOT NULL,
        FOREIGN KEY (cidadao_id) REFERENCES cidadaos (id) ON DELETE CASCADE
    );

    -- Consentimentos; um registro por cidadão e finalidade
    CREATE TABLE IF NOT EXISTS consentimentos_lgpd (
        id TEXT PRIMARY KEY NOT NULL,
        cidadao_id TEXT NOT NULL,
        finalidade TEXT NOT NULL,
        consentido BOOLEAN NOT NULL,
        token_consentimento TEXT NOT NULL UNIQUE,
        ip_address TEXT,
        user_agent TEXT NOT NULL DEFAULT '',
        data_consentimento TIMESTAMP NOT NULL,
        valido_ate TIMESTAMP NOT NULL,
        data_revogacao TIMESTAMP,
        UNIQUE (cidadao_id, finalidade),
        FOREIGN KEY (cidadao_id) REFERENCES cidadaos (id) ON DELETE CASCADE
    );

    -- Trilha de auditoria de acesso a dados pessoais
    CREATE TABLE IF NOT EXISTS auditoria_acessos (
        id TEXT PRIMARY KEY NOT NULL,
        usuario TEXT NOT NULL,
        cidadao_id TEXT NOT NULL,
        tipo_acao TEXT NOT NULL,
        detalhes TEXT NOT NULL DEFAULT '{}',
        ip_address TEXT,
        user_agent TEXT NOT NULL DEFAULT '',
        url_acessada TEXT NOT NULL DEFAULT '',
        timestamp TIMESTAMP NOT NULL
    );

    -- Violações e incidentes de segurança
    CREATE TABLE IF NOT EXISTS violacoes_dados (
        id TEXT PRIMARY KEY NOT NULL,
        tipo_violacao TEXT NOT NULL,
        severidade TEXT NOT NULL CHECK (severidade IN ('BAIXA', 'MEDIA', 'ALTA', 'CRITICA')),
        descricao TEXT NOT NULL,
        cidadaos_afetados TEXT NOT NULL DEFAULT '[]',
        tipos_dados_afetados TEXT NOT NULL DEFAULT '[]',
        data_deteccao TIMESTAMP NOT NULL,
        data_ocorrencia_estimada TIMESTAMP,
        detectado_por TEXT,
        acoes_corretivas TEXT NOT NULL DEFAULT '',
        anpd_notificada BOOLEAN NOT NULL DEFAULT 0,
        data_notificacao_anpd TIMESTAMP,
        cidadaos_notificados BOOLEAN NOT NULL DEFAULT 0,
        data_notificacao_cidadaos TIMESTAMP,
        resolvida BOOLEAN NOT NULL DEFAULT 0,
        data_resolucao TIMESTAMP
    );

    -- Registros estatísticos anonimizados
    CREATE TABLE IF NOT EXISTS dados_anonimizados (
        id TEXT PRIMARY KEY NOT NULL,
        hash_cidadao TEXT NOT NULL,
        faixa_etaria TEXT NOT NULL,
        sexo TEXT NOT NULL,
        regiao_residencia TEXT NOT NULL,
        tem_doenca_cronica BOOLEAN NOT NULL,
        categoria_imc TEXT NOT NULL DEFAULT '',
        nivel_risco_geral TEXT,
        data_anonimizacao TIMESTAMP NOT NULL,
        finalidade TEXT NOT NULL
    );

    CREATE INDEX IF NOT EXISTS idx_visitas_data ON visitas_agendadas (data_visita);
    CREATE INDEX IF NOT EXISTS idx_visitas_agente ON visitas_agendadas (agente, data_visita);
    CREATE INDEX IF NOT EXISTS idx_visitas_cidadao ON visitas_agendadas (cidadao_id, status);
    CREATE INDEX IF NOT EXISTS idx_auditoria_cidadao ON auditoria_acessos (cidadao_id, timestamp);
    CREATE INDEX IF NOT EXISTS idx_violacoes_deteccao ON violacoes_dados (data_deteccao);
    "#,
    // 003_anamnese_unica_por_coleta.sql
    r#"
    -- uma anamnese por coleta; duplicatas antigas ficam só com a mais antiga
    DELETE FROM anamneses
    WHERE rowid NOT IN (SELECT MIN(rowid) FROM anamneses GROUP BY dados_saude_id);

    CREATE UNIQUE INDEX IF NOT EXISTS idx_anamneses_coleta ON anamneses (dados_saude_id);
    "#,
];

/// Número de migrações conhecidas
pub fn versao_esquema() -> i64 {
    MIGRATIONS.len() as i64
}

/// Executa todas as migrações pendentes no banco de dados
pub async fn run_migrations(pool: &SqlitePool) -> Result<()> {
    info!("Aplicando migrações de banco de dados...");

    let version: i64 = match sqlx::query_scalar("PRAGMA user_version")
        .fetch_one(pool)
        .await
    {
        Ok(v) => v,
        Err(e) => {
            // primeira execução
            error!("Erro ao obter versão do banco: {}", e);
            0
        }
    };

    info!(versao = version, "Versão atual do banco");

    for (i, migration_sql) in MIGRATIONS.iter().enumerate() {
        let migration_version = (i + 1) as i64;

        if migration_version <= version {
            continue;
        }

        info!("Aplicando migração {}...", migration_version);

        let mut transaction = pool.begin().await.with_context(|| {
            format!("Falha ao iniciar transação para migração {}", migration_version)
        })?;

        (&mut *transaction)
            .execute(*migration_sql)
            .await
            .with_context(|| format!("Falha ao executar migração {}", migration_version))?;

        (&mut *transaction)
            .execute(format!("PRAGMA user_version = {}", migration_version).as_str())
            .await
            .with_context(|| format!("Falha ao atualizar versão para {}", migration_version))?;

        transaction.commit().await.with_context(|| {
            format!("Falha ao confirmar transação para migração {}", migration_version)
        })?;

        info!("Migração {} aplicada com sucesso", migration_version);
    }

    info!("Migrações concluídas. Versão atual: {}", MIGRATIONS.len());
    Ok(())
}
