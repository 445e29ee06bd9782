//! Curated word lists for comment analysis.
//!
//! Stop words (general Portuguese and English plus climate-survey filler),
//! a polarity lexicon, negators, and intensifiers. Every entry is stored in
//! normalized form: lower-case with diacritics removed.

use std::collections::{HashMap, HashSet};
use std::sync::LazyLock;

/// General-purpose Portuguese and English function words.
pub static GENERAL_STOP_WORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        // Portuguese
        "a", "ao", "aos", "aquela", "aquelas", "aquele", "aqueles", "aquilo", "as", "ate", "com",
        "como", "da", "das", "de", "dela", "delas", "dele", "deles", "depois", "do", "dos", "e",
        "ela", "elas", "ele", "eles", "em", "entre", "era", "eram", "essa", "essas", "esse",
        "esses", "esta", "estao", "estas", "estava", "estavam", "este", "estes", "estou", "eu",
        "foi", "foram", "ha", "isso", "isto", "ja", "lhe", "lhes", "mais", "mas", "me", "mesmo",
        "meu", "meus", "minha", "minhas", "muito", "muita", "muitos", "muitas", "na", "nas",
        "nem", "no", "nos", "nossa", "nossas", "nosso", "nossos", "num", "numa", "o", "os", "ou",
        "para", "pela", "pelas", "pelo", "pelos", "por", "qual", "quando", "que", "quem", "se",
        "seja", "sem", "ser", "seu", "seus", "so", "sua", "suas", "tambem", "te", "tem", "temos",
        "tenho", "ter", "teu", "tua", "um", "uma", "umas", "uns", "voce", "voces", "vos", "sao",
        "sobre", "sendo", "tendo", "pois", "onde", "porque", "assim", "ainda", "cada", "todo",
        "toda", "todos", "todas", "outro", "outra", "outros", "outras", "aqui", "bem", "pode",
        "podem", "deve", "devem", "seria", "fazer", "feito", "esta", "estar", "sempre", "nunca",
        "apenas", "alguns", "algumas", "algum", "alguma", "ela", "quanto", "quase", "entao",
        // English
        "the", "an", "and", "or", "but", "in", "on", "at", "to", "for", "of", "with", "by",
        "from", "up", "about", "into", "through", "during", "that", "this", "these", "those",
        "it", "its", "is", "are", "was", "were", "be", "been", "being", "have", "has", "had",
        "do", "does", "did", "will", "would", "should", "could", "may", "might", "must", "can",
        "which", "who", "when", "where", "why", "how", "if", "than", "then", "as", "so", "there",
        "their", "they", "them", "what", "very", "more", "most", "some", "also", "just", "only",
        "our", "we", "you", "your",
    ]
    .into_iter()
    .collect()
});

/// Climate-survey filler: organizational nouns and generic terms that show up
/// in nearly every comment and say nothing about the topic.
pub static SURVEY_STOP_WORDS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "empresa", "empresas", "organizacao", "instituicao", "setor", "setores", "area", "areas",
        "departamento", "pessoas", "pessoa", "colaborador", "colaboradores", "funcionario",
        "funcionarios", "servidor", "servidores", "gente", "coisa", "coisas", "forma", "parte",
        "vezes", "nada", "acho", "creio", "gostaria", "poderia", "precisa", "precisam",
        "existe", "existem", "sugestao", "sugestoes", "comentario", "comentarios", "pesquisa",
        "company", "organization", "department", "people", "employee", "employees", "thing",
        "things", "really", "would", "think",
    ]
    .into_iter()
    .collect()
});

/// Returns `true` if `word` is a general or survey-specific stop word.
pub fn is_stop_word(word: &str) -> bool {
    GENERAL_STOP_WORDS.contains(word) || SURVEY_STOP_WORDS.contains(word)
}

/// Word polarity in `[-1.0, 1.0]`.
pub static POLARITY_LEXICON: LazyLock<HashMap<&'static str, f64>> = LazyLock::new(|| {
    [
        // Portuguese, positive
        ("adoro", 0.8),
        ("adorar", 0.8),
        ("amo", 0.8),
        ("gosto", 0.5),
        ("gostar", 0.5),
        ("bom", 0.6),
        ("boa", 0.6),
        ("bons", 0.6),
        ("boas", 0.6),
        ("otimo", 0.9),
        ("otima", 0.9),
        ("excelente", 1.0),
        ("excelentes", 1.0),
        ("maravilhoso", 0.9),
        ("maravilhosa", 0.9),
        ("feliz", 0.7),
        ("satisfeito", 0.6),
        ("satisfeita", 0.6),
        ("agradavel", 0.6),
        ("motivado", 0.6),
        ("motivada", 0.6),
        ("respeito", 0.4),
        ("reconhecimento", 0.4),
        ("valorizado", 0.6),
        ("valorizada", 0.6),
        ("apoio", 0.4),
        ("parabens", 0.8),
        ("incrivel", 0.8),
        ("positivo", 0.5),
        ("positiva", 0.5),
        ("eficiente", 0.5),
        ("organizado", 0.4),
        ("colaborativo", 0.5),
        ("melhor", 0.5),
        ("orgulho", 0.7),
        ("tranquilo", 0.4),
        ("justo", 0.5),
        ("justa", 0.5),
        // Portuguese, negative
        ("odeio", -0.8),
        ("odiar", -0.8),
        ("ruim", -0.7),
        ("ruins", -0.7),
        ("pessimo", -1.0),
        ("pessima", -1.0),
        ("horrivel", -0.9),
        ("terrivel", -0.9),
        ("triste", -0.6),
        ("insatisfeito", -0.6),
        ("insatisfeita", -0.6),
        ("desmotivado", -0.6),
        ("desmotivada", -0.6),
        ("cansado", -0.4),
        ("cansada", -0.4),
        ("estressante", -0.6),
        ("estresse", -0.5),
        ("sobrecarga", -0.6),
        ("sobrecarregado", -0.6),
        ("sobrecarregada", -0.6),
        ("injusto", -0.6),
        ("injusta", -0.6),
        ("desrespeito", -0.7),
        ("assedio", -0.9),
        ("falta", -0.3),
        ("problema", -0.4),
        ("problemas", -0.4),
        ("dificil", -0.4),
        ("pior", -0.6),
        ("desorganizado", -0.5),
        ("desorganizada", -0.5),
        ("toxico", -0.8),
        ("toxica", -0.8),
        ("negativo", -0.5),
        ("negativa", -0.5),
        ("lento", -0.3),
        ("precario", -0.6),
        ("precaria", -0.6),
        ("descaso", -0.7),
        ("medo", -0.6),
        // English
        ("love", 0.5),
        ("like", 0.2),
        ("good", 0.7),
        ("great", 0.8),
        ("excellent", 1.0),
        ("happy", 0.8),
        ("amazing", 0.6),
        ("awesome", 1.0),
        ("nice", 0.6),
        ("supportive", 0.5),
        ("fair", 0.4),
        ("respect", 0.4),
        ("hate", -0.8),
        ("bad", -0.7),
        ("terrible", -1.0),
        ("awful", -1.0),
        ("horrible", -1.0),
        ("poor", -0.4),
        ("unfair", -0.5),
        ("toxic", -0.8),
        ("stressful", -0.6),
        ("sad", -0.5),
        ("worse", -0.4),
        ("worst", -1.0),
    ]
    .into_iter()
    .collect()
});

/// Words that flip the polarity of the next few tokens.
pub static NEGATORS: LazyLock<HashSet<&'static str>> = LazyLock::new(|| {
    [
        "nao", "nunca", "jamais", "nem", "sem", "nenhum", "nenhuma", "not", "no", "never",
        "without", "cannot", "isnt", "dont", "doesnt", "wasnt",
    ]
    .into_iter()
    .collect()
});

/// Words that amplify the polarity of the word that follows.
pub static INTENSIFIERS: LazyLock<HashMap<&'static str, f64>> = LazyLock::new(|| {
    [
        ("muito", 1.3),
        ("muita", 1.3),
        ("bastante", 1.3),
        ("super", 1.5),
        ("extremamente", 1.8),
        ("totalmente", 1.5),
        ("demais", 1.3),
        ("very", 1.3),
        ("really", 1.3),
        ("extremely", 1.8),
        ("totally", 1.5),
    ]
    .into_iter()
    .collect()
});
