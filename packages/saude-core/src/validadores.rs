//! Validação e formatação de identificadores e medições
//!
//! Cada validador aceita a entrada "suja" digitada pelo agente e devolve a
//! forma canônica usada na persistência, ou um `ErroValidacao`.

use chrono::{Datelike, NaiveDate};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::erro::ErroValidacao;

/// Idade máxima aceita no cadastro
pub const IDADE_MAXIMA: i32 = 150;

const FORMATOS_DATA: &[&str] = &["%d/%m/%Y", "%d-%m-%Y", "%d.%m.%Y", "%Y-%m-%d"];
const FORMATOS_DATA_ANO_CURTO: &[&str] = &["%d/%m/%y", "%d-%m-%y"];

static FORMATO_CPF: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d{3}\.\d{3}\.\d{3}-\d{2}$").unwrap());
static FORMATO_TELEFONE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\(\d{2}\)\s\d{4,5}-\d{4}$").unwrap());
static FORMATO_CEP: Lazy<Regex> = Lazy::new(|| Regex::new(r"^\d{5}-\d{3}$").unwrap());
static PRESSAO: Lazy<Regex> = Lazy::new(|| Regex::new(r"(\d+)[/x\s-]+(\d+)").unwrap());

fn somente_digitos(valor: &str) -> String {
    valor.chars().filter(char::is_ascii_digit).collect()
}

/// Pressão arterial validada
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PressaoArterial {
    pub sistolica: u32,
    pub diastolica: u32,
}

/// Valida os dígitos verificadores e devolve `000.000.000-00`
pub fn validar_cpf(cpf: &str) -> Result<String, ErroValidacao> {
    let digitos: Vec<u32> = cpf.chars().filter_map(|c| c.to_digit(10)).collect();
    let invalido = || ErroValidacao::CpfInvalido(cpf.to_string());

    if digitos.len() != 11 {
        return Err(invalido());
    }
    if digitos.iter().all(|d| *d == digitos[0]) {
        return Err(invalido());
    }

    let digito_verificador = |parcial: &[u32]| {
        let peso_inicial = parcial.len() as u32 + 1;
        let soma: u32 = parcial
            .iter()
            .enumerate()
            .map(|(i, d)| d * (peso_inicial - i as u32))
            .sum();
        match soma % 11 {
            resto if resto < 2 => 0,
            resto => 11 - resto,
        }
    };

    if digito_verificador(&digitos[..9]) != digitos[9]
        || digito_verificador(&digitos[..10]) != digitos[10]
    {
        return Err(invalido());
    }

    let d: String = digitos.iter().map(|d| char::from_digit(*d, 10).unwrap_or('0')).collect();
    Ok(format!("{}.{}.{}-{}", &d[..3], &d[3..6], &d[6..9], &d[9..]))
}

/// Aceita 10 ou 11 dígitos; celular antigo de 10 dígitos ganha o nono dígito
pub fn validar_telefone(telefone: &str) -> Result<String, ErroValidacao> {
    let mut digitos = somente_digitos(telefone);
    if digitos.len() != 10 && digitos.len() != 11 {
        return Err(ErroValidacao::TelefoneInvalido(telefone.to_string()));
    }

    if digitos.len() == 10 && matches!(digitos.as_bytes()[2], b'6'..=b'9') {
        digitos.insert(2, '9');
    }

    let formatado = if digitos.len() == 11 {
        format!("({}) {}-{}", &digitos[..2], &digitos[2..7], &digitos[7..])
    } else {
        format!("({}) {}-{}", &digitos[..2], &digitos[2..6], &digitos[6..])
    };
    Ok(formatado)
}

pub fn validar_cep(cep: &str) -> Result<String, ErroValidacao> {
    let digitos = somente_digitos(cep);
    if digitos.len() != 8 {
        return Err(ErroValidacao::CepInvalido(cep.to_string()));
    }
    Ok(format!("{}-{}", &digitos[..5], &digitos[5..]))
}

/// Aceita `120/80`, `120x80`, `120 80` e `120-80`
pub fn validar_pressao_arterial(pressao: &str) -> Result<PressaoArterial, ErroValidacao> {
    let invalida = || ErroValidacao::PressaoInvalida(pressao.to_string());

    let captura = PRESSAO.captures(pressao.trim()).ok_or_else(invalida)?;
    let sistolica: u32 = captura[1].parse().map_err(|_| invalida())?;
    let diastolica: u32 = captura[2].parse().map_err(|_| invalida())?;

    if !(70..=250).contains(&sistolica) || !(40..=150).contains(&diastolica) {
        return Err(invalida());
    }
    if sistolica <= diastolica {
        return Err(invalida());
    }

    Ok(PressaoArterial {
        sistolica,
        diastolica,
    })
}

/// Interpreta a data em vários formatos. Datas futuras ou com mais de
/// 150 anos são rejeitadas.
pub fn validar_data_nascimento(data: &str, hoje: NaiveDate) -> Result<NaiveDate, ErroValidacao> {
    let texto = data.trim();
    let invalida = || ErroValidacao::DataNascimentoInvalida(data.to_string());

    // "%Y" aceitaria "95" como ano 95; o ano curto decide a lista de formatos
    let ano_completo = texto
        .split(|c: char| !c.is_ascii_digit())
        .any(|grupo| grupo.len() == 4);
    let formatos = if ano_completo {
        FORMATOS_DATA
    } else {
        FORMATOS_DATA_ANO_CURTO
    };
    let nascimento = formatos
        .iter()
        .find_map(|formato| NaiveDate::parse_from_str(texto, formato).ok())
        .ok_or_else(invalida)?;

    if nascimento > hoje || hoje.year() - nascimento.year() > IDADE_MAXIMA {
        return Err(invalida());
    }
    Ok(nascimento)
}

pub fn cpf_bem_formatado(cpf: &str) -> bool {
    FORMATO_CPF.is_match(cpf)
}

pub fn telefone_bem_formatado(telefone: &str) -> bool {
    FORMATO_TELEFONE.is_match(telefone)
}

pub fn cep_bem_formatado(cep: &str) -> bool {
    FORMATO_CEP.is_match(cep)
}

/// UF com duas letras maiúsculas
pub fn validar_uf(uf: &str) -> bool {
    uf.len() == 2 && uf.chars().all(|c| c.is_ascii_uppercase())
}
