//! Normalização de texto médico digitado em campo
//!
//! Agentes digitam rápido e no celular; o texto chega com abreviações,
//! erros comuns e acentuação irregular. Aqui o texto é reduzido a uma forma
//! canônica (minúsculas, sem acentos, sem espaços repetidos) antes de
//! qualquer busca por palavras-chave.

use once_cell::sync::Lazy;
use regex::Regex;

/// Correções aplicadas sobre o texto já sem acentos, por palavra inteira
const CORRECOES_COMUNS: &[(&str, &str)] = &[
    ("mta dor", "muita dor"),
    ("mt dor", "muita dor"),
    ("nenhuma dor", "sem dor"),
    ("sem dr", "sem dor"),
    ("dor d cabeca", "dor de cabeca"),
    ("dor d barriga", "dor de barriga"),
    ("dor nas costa", "dor nas costas"),
    ("febr", "febre"),
    ("tosse c catarro", "tosse com catarro"),
    ("falta d ar", "falta de ar"),
    ("cansaso", "cansaco"),
    ("tontera", "tontura"),
    ("diabete", "diabetes"),
    ("naum", "nao"),
    ("mto", "muito"),
    ("mt", "muito"),
];

/// Sintomas reconhecidos por `extrair_sintomas`, na forma de exibição
pub const SINTOMAS_CONHECIDOS: &[&str] = &[
    "dor de cabeça",
    "dor no peito",
    "dor nas costas",
    "dor de barriga",
    "febre",
    "tosse",
    "falta de ar",
    "cansaço",
    "tontura",
    "náusea",
    "vômito",
    "diarreia",
    "constipação",
    "insônia",
    "mal estar",
];

static CORRECOES: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    CORRECOES_COMUNS
        .iter()
        .filter_map(|(erro, correcao)| {
            Regex::new(&format!(r"\b{}\b", regex::escape(erro)))
                .ok()
                .map(|re| (re, *correcao))
        })
        .collect()
});

/// Remove diacríticos do alfabeto português
pub fn remover_acentos(texto: &str) -> String {
    texto
        .chars()
        .map(|c| match c {
            'á' | 'à' | 'â' | 'ã' | 'ä' => 'a',
            'Á' | 'À' | 'Â' | 'Ã' | 'Ä' => 'A',
            'é' | 'è' | 'ê' | 'ë' => 'e',
            'É' | 'È' | 'Ê' | 'Ë' => 'E',
            'í' | 'ì' | 'î' | 'ï' => 'i',
            'Í' | 'Ì' | 'Î' | 'Ï' => 'I',
            'ó' | 'ò' | 'ô' | 'õ' | 'ö' => 'o',
            'Ó' | 'Ò' | 'Ô' | 'Õ' | 'Ö' => 'O',
            'ú' | 'ù' | 'û' | 'ü' => 'u',
            'Ú' | 'Ù' | 'Û' | 'Ü' => 'U',
            'ç' => 'c',
            'Ç' => 'C',
            'ñ' => 'n',
            'Ñ' => 'N',
            outro => outro,
        })
        .collect()
}

/// Minúsculas, sem acentos, correções aplicadas e espaços colapsados
pub fn normalizar_texto(texto: &str) -> String {
    if texto.trim().is_empty() {
        return String::new();
    }

    let mut normalizado = remover_acentos(&texto.to_lowercase())
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ");
    for (erro, correcao) in CORRECOES.iter() {
        normalizado = erro.replace_all(&normalizado, *correcao).into_owned();
    }
    normalizado
}

/// Sintomas conhecidos presentes no texto, na ordem da lista de referência
pub fn extrair_sintomas(texto: &str) -> Vec<&'static str> {
    let normalizado = normalizar_texto(texto);
    if normalizado.is_empty() {
        return Vec::new();
    }

    SINTOMAS_CONHECIDOS
        .iter()
        .copied()
        .filter(|sintoma| normalizado.contains(&remover_acentos(sintoma)))
        .collect()
}
