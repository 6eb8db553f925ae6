//! Coordenadas do mapa de risco

use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::lgpd::mascarar_nome;
use crate::modelos::{LocalizacaoSaude, NivelRisco};

/// Metros por grau de latitude (aproximação)
const METROS_POR_GRAU: f64 = 111_000.0;

/// Dispersão aplicada a coordenadas obtidas pelo CEP
pub const RAIO_JITTER_CEP_METROS: f64 = 800.0;
/// Dispersão aplicada quando só a cidade foi encontrada
pub const RAIO_JITTER_CIDADE_METROS: f64 = 1500.0;

/// Limite de marcadores devolvidos pelo mapa
pub const LIMITE_MARCADORES: usize = 1000;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordenadas {
    pub latitude: f64,
    pub longitude: f64,
}

impl Coordenadas {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }

    /// Distância aproximada em metros, pela projeção equiretangular
    pub fn distancia_metros(&self, outra: &Coordenadas) -> f64 {
        let lat_media = ((self.latitude + outra.latitude) / 2.0).to_radians();
        let dy = (self.latitude - outra.latitude) * METROS_POR_GRAU;
        let dx = (self.longitude - outra.longitude) * METROS_POR_GRAU * lat_media.cos();
        (dx * dx + dy * dy).sqrt()
    }
}

/// Desloca o ponto em direção e distância aleatórias, até `raio_metros`,
/// para que cidadãos do mesmo CEP não se sobreponham no mapa.
pub fn adicionar_jitter<R: Rng + ?Sized>(
    origem: Coordenadas,
    raio_metros: f64,
    rng: &mut R,
) -> Coordenadas {
    if raio_metros <= 0.0 {
        return origem;
    }
    let metros_por_grau_lng = METROS_POR_GRAU * origem.latitude.to_radians().cos();
    if metros_por_grau_lng.abs() < f64::EPSILON {
        return origem;
    }

    let angulo = rng.gen_range(0.0..std::f64::consts::TAU);
    let distancia = rng.gen_range(0.0..=raio_metros);

    Coordenadas {
        latitude: origem.latitude + distancia * angulo.cos() / METROS_POR_GRAU,
        longitude: origem.longitude + distancia * angulo.sin() / metros_por_grau_lng,
    }
}

/// Ponto GeoJSON; a ordem é [longitude, latitude]
pub fn ponto_geojson(coordenadas: Coordenadas) -> serde_json::Value {
    json!({
        "type": "Point",
        "coordinates": [coordenadas.longitude, coordenadas.latitude],
    })
}

/// Marcador exibido no mapa de risco. O nome vai reduzido às iniciais.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MarcadorMapa {
    pub id: Uuid,
    pub cidadao_id: Uuid,
    pub lat: f64,
    pub lng: f64,
    pub iniciais: String,
    pub idade: Option<u32>,
    pub endereco: String,
    pub cidade: String,
    pub nivel_risco: NivelRisco,
    pub pontuacao_risco: i64,
    pub data_coleta: String,
    pub cor_marcador: String,
    pub anamnese_id: Option<Uuid>,
}

impl MarcadorMapa {
    pub fn new(localizacao: &LocalizacaoSaude, nome: &str, idade: Option<u32>) -> Self {
        Self {
            id: localizacao.id,
            cidadao_id: localizacao.cidadao_id,
            lat: localizacao.latitude,
            lng: localizacao.longitude,
            iniciais: mascarar_nome(nome),
            idade,
            endereco: localizacao.endereco_completo.clone(),
            cidade: localizacao.cidade.clone(),
            nivel_risco: localizacao.nivel_risco,
            pontuacao_risco: localizacao.pontuacao_risco,
            data_coleta: localizacao.atualizado_em.format("%d/%m/%Y %H:%M").to_string(),
            cor_marcador: localizacao.cor_marcador().to_string(),
            anamnese_id: localizacao.anamnese_id,
        }
    }

    pub fn coordenadas(&self) -> Coordenadas {
        Coordenadas::new(self.lat, self.lng)
    }
}

/// Coleção GeoJSON com os marcadores e suas propriedades
pub fn colecao_geojson(marcadores: &[MarcadorMapa], gerado_em: DateTime<Utc>) -> serde_json::Value {
    let features: Vec<serde_json::Value> = marcadores
        .iter()
        .map(|m| {
            json!({
                "type": "Feature",
                "geometry": ponto_geojson(m.coordenadas()),
                "properties": {
                    "id": m.id,
                    "iniciais": m.iniciais,
                    "idade": m.idade,
                    "cidade": m.cidade,
                    "nivel_risco": m.nivel_risco,
                    "pontuacao_risco": m.pontuacao_risco,
                    "cor_marcador": m.cor_marcador,
                },
            })
        })
        .collect();

    json!({
        "type": "FeatureCollection",
        "features": features,
        "metadata": {
            "total": marcadores.len(),
            "gerado_em": gerado_em.to_rfc3339(),
        },
    })
}
