//! Cadastro de cidadãos

use chrono::{DateTime, Utc};
use saude_core::modelos::Cidadao;
use sqlx::SqlitePool;
use tracing::{debug, info};
use uuid::Uuid;

use super::Paginacao;
use crate::crypto::Cofre;
use crate::error::DbError;
use crate::models::{CidadaoCifrado, ResumoCidadao};

const COLUNAS: &str = "id, nome, cpf_indice, cpf_ciphertext, cpf_nonce, data_nascimento, sexo,
    estado_civil, telefone_ciphertext, telefone_nonce, email_ciphertext, email_nonce,
    endereco_ciphertext, endereco_nonce, cep, bairro, cidade, estado, latitude, longitude,
    endereco_capturado_automaticamente, profissao, renda_familiar, possui_plano_saude,
    hipertensao, diabetes, doenca_cardiaca, doenca_renal, asma, depressao,
    medicamentos_continuo, alergias_conhecidas, cirurgias_anteriores, criado_em,
    atualizado_em, ativo";

/// Filtros da listagem de cidadãos ativos
#[derive(Debug, Clone, Default)]
pub struct FiltroCidadaos {
    /// Trecho do nome, sem diferenciar maiúsculas
    pub nome: Option<String>,
    pub cidade: Option<String>,
    pub paginacao: Paginacao,
}

/// Grava os campos do cidadão; `indice_cpf` é o valor usado na restrição de unicidade
async fn gravar(
    pool: &SqlitePool,
    cofre: &Cofre,
    cidadao: &Cidadao,
    indice_cpf: String,
    sql: &str,
) -> Result<u64, DbError> {
    let cpf = cofre.cifrar(&cidadao.cpf)?;
    let telefone = cofre.cifrar(&cidadao.telefone)?;
    let email = cidadao
        .email
        .as_deref()
        .filter(|e| !e.is_empty())
        .map(|e| cofre.cifrar(e))
        .transpose()?;
    let endereco = cofre.cifrar(&cidadao.endereco)?;
    let c = &cidadao.condicoes;

    let resultado = sqlx::query(sql)
        .bind(cidadao.id.to_string())
        .bind(&cidadao.nome)
        .bind(indice_cpf)
        .bind(cpf.ciphertext)
        .bind(cpf.nonce)
        .bind(cidadao.data_nascimento)
        .bind(cidadao.sexo.as_str())
        .bind(cidadao.estado_civil.as_str())
        .bind(telefone.ciphertext)
        .bind(telefone.nonce)
        .bind(email.as_ref().map(|e| e.ciphertext.clone()))
        .bind(email.map(|e| e.nonce))
        .bind(endereco.ciphertext)
        .bind(endereco.nonce)
        .bind(&cidadao.cep)
        .bind(&cidadao.bairro)
        .bind(&cidadao.cidade)
        .bind(&cidadao.estado)
        .bind(cidadao.latitude)
        .bind(cidadao.longitude)
        .bind(cidadao.endereco_capturado_automaticamente)
        .bind(&cidadao.profissao)
        .bind(cidadao.renda_familiar)
        .bind(cidadao.possui_plano_saude)
        .bind(c.hipertensao)
        .bind(c.diabetes)
        .bind(c.doenca_cardiaca)
        .bind(c.doenca_renal)
        .bind(c.asma)
        .bind(c.depressao)
        .bind(&cidadao.medicamentos_continuo)
        .bind(&cidadao.alergias_conhecidas)
        .bind(&cidadao.cirurgias_anteriores)
        .bind(cidadao.criado_em)
        .bind(cidadao.atualizado_em)
        .bind(cidadao.ativo)
        .execute(pool)
        .await
        .map_err(|e| match DbError::from(e) {
            DbError::ConstraintViolation(_) => {
                DbError::ConstraintViolation("CPF já cadastrado".to_string())
            }
            outro => outro,
        })?;

    Ok(resultado.rows_affected())
}

pub async fn inserir(pool: &SqlitePool, cofre: &Cofre, cidadao: &Cidadao) -> Result<(), DbError> {
    let sql = format!(
        "INSERT INTO cidadaos ({}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?,
         ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        COLUNAS
    );
    let indice = cofre.indice_cego(&cidadao.cpf)?;
    gravar(pool, cofre, cidadao, indice, &sql).await?;
    info!(cidadao_id = %cidadao.id, cidade = %cidadao.cidade, "Cidadão cadastrado");
    Ok(())
}

/// Regrava todos os campos; o CPF pode mudar e o índice é recalculado
pub async fn atualizar(pool: &SqlitePool, cofre: &Cofre, cidadao: &Cidadao) -> Result<(), DbError> {
    let indice = cofre.indice_cego(&cidadao.cpf)?;
    atualizar_com_indice(pool, cofre, cidadao, indice).await
}

async fn atualizar_com_indice(
    pool: &SqlitePool,
    cofre: &Cofre,
    cidadao: &Cidadao,
    indice: String,
) -> Result<(), DbError> {
    // mesma ordem de COLUNAS, com o id de novo no WHERE
    let sql = "UPDATE cidadaos SET id = ?1, nome = ?2, cpf_indice = ?3, cpf_ciphertext = ?4,
        cpf_nonce = ?5, data_nascimento = ?6, sexo = ?7, estado_civil = ?8,
        telefone_ciphertext = ?9, telefone_nonce = ?10, email_ciphertext = ?11,
        email_nonce = ?12, endereco_ciphertext = ?13, endereco_nonce = ?14, cep = ?15,
        bairro = ?16, cidade = ?17, estado = ?18, latitude = ?19, longitude = ?20,
        endereco_capturado_automaticamente = ?21, profissao = ?22, renda_familiar = ?23,
        possui_plano_saude = ?24, hipertensao = ?25, diabetes = ?26, doenca_cardiaca = ?27,
        doenca_renal = ?28, asma = ?29, depressao = ?30, medicamentos_continuo = ?31,
        alergias_conhecidas = ?32, cirurgias_anteriores = ?33, criado_em = ?34,
        atualizado_em = ?35, ativo = ?36
        WHERE id = ?1";
    let alteradas = gravar(pool, cofre, cidadao, indice, sql).await?;
    if alteradas == 0 {
        return Err(DbError::nao_encontrado("cidadão", cidadao.id));
    }
    debug!(cidadao_id = %cidadao.id, "Cidadão atualizado");
    Ok(())
}

pub async fn buscar(pool: &SqlitePool, cofre: &Cofre, id: Uuid) -> Result<Cidadao, DbError> {
    let sql = format!("SELECT {} FROM cidadaos WHERE id = ?", COLUNAS);
    let cifrado: Option<CidadaoCifrado> = sqlx::query_as(&sql)
        .bind(id.to_string())
        .fetch_optional(pool)
        .await?;
    cifrado
        .ok_or_else(|| DbError::nao_encontrado("cidadão", id))?
        .decifrar(cofre)
}

/// Busca pelo CPF já formatado, através do índice cego
pub async fn buscar_por_cpf(
    pool: &SqlitePool,
    cofre: &Cofre,
    cpf: &str,
) -> Result<Option<Cidadao>, DbError> {
    let sql = format!("SELECT {} FROM cidadaos WHERE cpf_indice = ?", COLUNAS);
    let cifrado: Option<CidadaoCifrado> = sqlx::query_as(&sql)
        .bind(cofre.indice_cego(cpf)?)
        .fetch_optional(pool)
        .await?;
    cifrado.map(|c| c.decifrar(cofre)).transpose()
}

pub async fn existe(pool: &SqlitePool, id: Uuid) -> Result<bool, DbError> {
    let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM cidadaos WHERE id = ? AND ativo = 1")
        .bind(id.to_string())
        .fetch_one(pool)
        .await?;
    Ok(total > 0)
}

pub async fn listar(pool: &SqlitePool, filtro: &FiltroCidadaos) -> Result<Vec<ResumoCidadao>, DbError> {
    let resumos = sqlx::query_as(
        "SELECT id, nome, data_nascimento, cidade, estado, latitude, ativo
         FROM cidadaos
         WHERE ativo = 1
           AND (?1 IS NULL OR nome LIKE '%' || ?1 || '%')
           AND (?2 IS NULL OR cidade LIKE '%' || ?2 || '%')
         ORDER BY nome
         LIMIT ?3 OFFSET ?4",
    )
    .bind(filtro.nome.as_deref())
    .bind(filtro.cidade.as_deref())
    .bind(filtro.paginacao.limite())
    .bind(filtro.paginacao.deslocamento())
    .fetch_all(pool)
    .await?;
    Ok(resumos)
}

/// Todos os cidadãos ativos, decifrados
pub async fn listar_ativos(pool: &SqlitePool, cofre: &Cofre) -> Result<Vec<Cidadao>, DbError> {
    let sql = format!("SELECT {} FROM cidadaos WHERE ativo = 1 ORDER BY criado_em", COLUNAS);
    let cifrados: Vec<CidadaoCifrado> = sqlx::query_as(&sql).fetch_all(pool).await?;
    cifrados.into_iter().map(|c| c.decifrar(cofre)).collect()
}

/// Cidadãos ativos ainda sem ponto no mapa de risco
pub async fn listar_sem_localizacao(
    pool: &SqlitePool,
    cofre: &Cofre,
    limite: i64,
) -> Result<Vec<Cidadao>, DbError> {
    let sql = format!(
        "SELECT {} FROM cidadaos c
         WHERE c.ativo = 1
           AND NOT EXISTS (SELECT 1 FROM localizacoes_saude l WHERE l.cidadao_id = c.id)
         ORDER BY c.criado_em
         LIMIT ?",
        COLUNAS
    );
    let cifrados: Vec<CidadaoCifrado> = sqlx::query_as(&sql).bind(limite).fetch_all(pool).await?;
    cifrados.into_iter().map(|c| c.decifrar(cofre)).collect()
}

pub async fn atualizar_coordenadas(
    pool: &SqlitePool,
    id: Uuid,
    latitude: f64,
    longitude: f64,
    agora: DateTime<Utc>,
) -> Result<(), DbError> {
    let resultado = sqlx::query(
        "UPDATE cidadaos
         SET latitude = ?, longitude = ?, endereco_capturado_automaticamente = 1, atualizado_em = ?
         WHERE id = ?",
    )
    .bind(latitude)
    .bind(longitude)
    .bind(agora)
    .bind(id.to_string())
    .execute(pool)
    .await?;
    if resultado.rows_affected() == 0 {
        return Err(DbError::nao_encontrado("cidadão", id));
    }
    Ok(())
}

/// Exclusão lógica
pub async fn desativar(pool: &SqlitePool, id: Uuid, agora: DateTime<Utc>) -> Result<(), DbError> {
    let resultado = sqlx::query("UPDATE cidadaos SET ativo = 0, atualizado_em = ? WHERE id = ? AND ativo = 1")
        .bind(agora)
        .bind(id.to_string())
        .execute(pool)
        .await?;
    if resultado.rows_affected() == 0 {
        return Err(DbError::nao_encontrado("cidadão", id));
    }
    info!(cidadao_id = %id, "Cidadão desativado");
    Ok(())
}

/// Grava a versão mascarada do cadastro. O CPF mascarado não é único, então o
/// índice passa a ser derivado do id do cidadão.
pub async fn gravar_anonimizado(
    pool: &SqlitePool,
    cofre: &Cofre,
    mascarado: &Cidadao,
) -> Result<(), DbError> {
    let indice = cofre.indice_cego(&format!("anonimizado:{}", mascarado.id))?;
    atualizar_com_indice(pool, cofre, mascarado, indice).await?;
    info!(cidadao_id = %mascarado.id, "Cadastro anonimizado");
    Ok(())
}

pub async fn contar_ativos(pool: &SqlitePool) -> Result<i64, DbError> {
    Ok(sqlx::query_scalar("SELECT COUNT(*) FROM cidadaos WHERE ativo = 1")
        .fetch_one(pool)
        .await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testes::{banco_temporario, cidadao_exemplo};

    #[tokio::test]
    async fn test_inserir_e_buscar_decifra() -> anyhow::Result<()> {
        let banco = banco_temporario().await?;
        let cidadao = cidadao_exemplo("529.982.247-25");
        inserir(&banco.pool, &banco.cofre, &cidadao).await?;

        let lido = buscar(&banco.pool, &banco.cofre, cidadao.id).await?;
        assert_eq!(lido.cpf, "529.982.247-25");
        assert_eq!(lido.telefone, cidadao.telefone);
        assert_eq!(lido.email, cidadao.email);
        assert_eq!(lido.endereco, cidadao.endereco);
        assert_eq!(lido.condicoes, cidadao.condicoes);

        // nada do CPF em claro no arquivo
        let bruto: Vec<u8> = sqlx::query_scalar("SELECT cpf_ciphertext FROM cidadaos")
            .fetch_one(&banco.pool)
            .await?;
        assert!(!String::from_utf8_lossy(&bruto).contains("529"));
        Ok(())
    }

    #[tokio::test]
    async fn test_cpf_duplicado() -> anyhow::Result<()> {
        let banco = banco_temporario().await?;
        inserir(&banco.pool, &banco.cofre, &cidadao_exemplo("529.982.247-25")).await?;
        let erro = inserir(&banco.pool, &banco.cofre, &cidadao_exemplo("529.982.247-25"))
            .await
            .unwrap_err();
        assert!(matches!(erro, DbError::ConstraintViolation(_)));

        let achado = buscar_por_cpf(&banco.pool, &banco.cofre, "529.982.247-25").await?;
        assert!(achado.is_some());
        assert!(buscar_por_cpf(&banco.pool, &banco.cofre, "111.444.777-35").await?.is_none());
        Ok(())
    }

    #[tokio::test]
    async fn test_listar_filtra_e_oculta_desativados() -> anyhow::Result<()> {
        let banco = banco_temporario().await?;
        let a = cidadao_exemplo("529.982.247-25");
        let mut b = cidadao_exemplo("111.444.777-35");
        b.nome = "Carlos Pereira".to_string();
        b.cidade = "Recife".to_string();
        inserir(&banco.pool, &banco.cofre, &a).await?;
        inserir(&banco.pool, &banco.cofre, &b).await?;

        let filtro = FiltroCidadaos {
            cidade: Some("reci".to_string()),
            ..Default::default()
        };
        let lista = listar(&banco.pool, &filtro).await?;
        assert_eq!(lista.len(), 1);
        assert_eq!(lista[0].nome, "Carlos Pereira");

        desativar(&banco.pool, b.id, Utc::now()).await?;
        assert!(listar(&banco.pool, &filtro).await?.is_empty());
        assert_eq!(contar_ativos(&banco.pool).await?, 1);
        assert!(matches!(
            desativar(&banco.pool, b.id, Utc::now()).await,
            Err(DbError::NotFound(_))
        ));
        Ok(())
    }

    #[tokio::test]
    async fn test_sem_localizacao() -> anyhow::Result<()> {
        let banco = banco_temporario().await?;
        let cidadao = cidadao_exemplo("529.982.247-25");
        inserir(&banco.pool, &banco.cofre, &cidadao).await?;
        let pendentes = listar_sem_localizacao(&banco.pool, &banco.cofre, 10).await?;
        assert_eq!(pendentes.len(), 1);

        atualizar_coordenadas(&banco.pool, cidadao.id, -3.73, -38.52, Utc::now()).await?;
        let lido = buscar(&banco.pool, &banco.cofre, cidadao.id).await?;
        assert_eq!(lido.coordenadas(), Some((-3.73, -38.52)));
        assert!(lido.endereco_capturado_automaticamente);
        Ok(())
    }
}
