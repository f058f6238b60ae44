//! Named-entity lookups: drivers to three-letter codes, Grand Prix names and circuits to the
//! canonical event name used by the data server.
//!
//! Matching is case-insensitive, accent-insensitive and substring tolerant in both directions.
//! More than one distinct match is treated as not found.

use once_cell::sync::Lazy;
use std::collections::BTreeSet;

/// (search key, code). Keys are lowercase ASCII.
const DRIVERS: &[(&str, &str)] = &[
    ("max verstappen", "VER"),
    ("verstappen", "VER"),
    ("lando norris", "NOR"),
    ("norris", "NOR"),
    ("charles leclerc", "LEC"),
    ("leclerc", "LEC"),
    ("lewis hamilton", "HAM"),
    ("hamilton", "HAM"),
    ("george russell", "RUS"),
    ("russell", "RUS"),
    ("oscar piastri", "PIA"),
    ("piastri", "PIA"),
    ("carlos sainz", "SAI"),
    ("sainz", "SAI"),
    ("fernando alonso", "ALO"),
    ("alonso", "ALO"),
    ("lance stroll", "STR"),
    ("stroll", "STR"),
    ("sergio perez", "PER"),
    ("perez", "PER"),
    ("checo", "PER"),
    ("pierre gasly", "GAS"),
    ("gasly", "GAS"),
    ("esteban ocon", "OCO"),
    ("ocon", "OCO"),
    ("alexander albon", "ALB"),
    ("albon", "ALB"),
    ("yuki tsunoda", "TSU"),
    ("tsunoda", "TSU"),
    ("nico hulkenberg", "HUL"),
    ("hulkenberg", "HUL"),
    ("kevin magnussen", "MAG"),
    ("magnussen", "MAG"),
    ("valtteri bottas", "BOT"),
    ("bottas", "BOT"),
    ("zhou guanyu", "ZHO"),
    ("guanyu", "ZHO"),
    ("daniel ricciardo", "RIC"),
    ("ricciardo", "RIC"),
    ("liam lawson", "LAW"),
    ("lawson", "LAW"),
    ("oliver bearman", "BEA"),
    ("bearman", "BEA"),
    ("franco colapinto", "COL"),
    ("colapinto", "COL"),
    ("andrea kimi antonelli", "ANT"),
    ("antonelli", "ANT"),
    ("isack hadjar", "HAD"),
    ("hadjar", "HAD"),
    ("gabriel bortoleto", "BOR"),
    ("bortoleto", "BOR"),
    ("jack doohan", "DOO"),
    ("doohan", "DOO"),
    ("logan sargeant", "SAR"),
    ("sargeant", "SAR"),
    ("nyck de vries", "DEV"),
    ("de vries", "DEV"),
    ("mick schumacher", "MSC"),
    ("schumacher", "MSC"),
    ("sebastian vettel", "VET"),
    ("vettel", "VET"),
    ("kimi raikkonen", "RAI"),
    ("raikkonen", "RAI"),
    ("nicholas latifi", "LAT"),
    ("latifi", "LAT"),
    ("antonio giovinazzi", "GIO"),
    ("giovinazzi", "GIO"),
    ("nikita mazepin", "MAZ"),
    ("mazepin", "MAZ"),
];

/// (canonical event name, aliases). Aliases are lowercase ASCII.
const GRANDS_PRIX: &[(&str, &[&str])] = &[
    ("Bahrain Grand Prix", &["bahrain", "sakhir"]),
    ("Saudi Arabian Grand Prix", &["saudi", "saudi arabia", "saudi arabian", "jeddah"]),
    ("Australian Grand Prix", &["australia", "australian", "melbourne", "albert park"]),
    ("Japanese Grand Prix", &["japan", "japanese", "suzuka"]),
    ("Chinese Grand Prix", &["china", "chinese", "shanghai"]),
    ("Miami Grand Prix", &["miami"]),
    ("Emilia Romagna Grand Prix", &["emilia romagna", "imola"]),
    ("Monaco Grand Prix", &["monaco", "monte carlo"]),
    ("Canadian Grand Prix", &["canada", "canadian", "montreal"]),
    ("Spanish Grand Prix", &["spain", "spanish", "barcelona", "catalunya"]),
    ("Austrian Grand Prix", &["austria", "austrian", "spielberg", "red bull ring"]),
    ("British Grand Prix", &["britain", "british", "silverstone", "uk"]),
    ("Hungarian Grand Prix", &["hungary", "hungarian", "hungaroring", "budapest"]),
    ("Belgian Grand Prix", &["belgium", "belgian", "spa", "spa-francorchamps"]),
    ("Dutch Grand Prix", &["netherlands", "dutch", "zandvoort"]),
    ("Italian Grand Prix", &["italy", "italian", "monza"]),
    ("Azerbaijan Grand Prix", &["azerbaijan", "baku"]),
    ("Singapore Grand Prix", &["singapore", "marina bay"]),
    ("United States Grand Prix", &["united states", "usa", "austin", "cota"]),
    ("Mexico City Grand Prix", &["mexico", "mexican", "mexico city"]),
    ("São Paulo Grand Prix", &["sao paulo", "brazil", "brazilian", "interlagos"]),
    ("Las Vegas Grand Prix", &["las vegas", "vegas"]),
    ("Qatar Grand Prix", &["qatar", "lusail"]),
    ("Abu Dhabi Grand Prix", &["abu dhabi", "yas marina"]),
];

/// Words that never name a driver even though they are substrings of one.
const STOPWORDS: &[&str] = &[
    "and", "the", "with", "versus", "against", "compare", "between", "race", "about", "what",
    "how", "who", "won", "win", "was", "this", "that", "stats", "performance", "results", "last",
    "next", "season", "grand", "prix", "lap", "laps", "fastest", "driver", "drivers", "did",
];

static DRIVER_CODES: Lazy<BTreeSet<&'static str>> =
    Lazy::new(|| DRIVERS.iter().map(|(_, code)| *code).collect());

/// Fold accented Latin letters to ASCII and lowercase.
pub fn fold(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        let folded = match c {
            'á' | 'à' | 'â' | 'ä' | 'ã' | 'å' | 'Á' | 'À' | 'Â' | 'Ä' | 'Ã' | 'Å' => "a",
            'é' | 'è' | 'ê' | 'ë' | 'É' | 'È' | 'Ê' | 'Ë' => "e",
            'í' | 'ì' | 'î' | 'ï' | 'Í' | 'Ì' | 'Î' | 'Ï' => "i",
            'ó' | 'ò' | 'ô' | 'ö' | 'õ' | 'ø' | 'Ó' | 'Ò' | 'Ô' | 'Ö' | 'Õ' | 'Ø' => "o",
            'ú' | 'ù' | 'û' | 'ü' | 'Ú' | 'Ù' | 'Û' | 'Ü' => "u",
            'ý' | 'ÿ' | 'Ý' => "y",
            'ñ' | 'Ñ' => "n",
            'ç' | 'Ç' => "c",
            'ß' => "ss",
            'æ' | 'Æ' => "ae",
            _ => {
                out.extend(c.to_lowercase());
                continue;
            }
        };
        out.push_str(folded);
    }
    out
}

/// Split folded text into words, keeping hyphenated names whole.
fn words(folded: &str) -> Vec<&str> {
    folded
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '-'))
        .filter(|w| !w.is_empty())
        .collect()
}

pub fn is_driver_code(token: &str) -> bool {
    DRIVER_CODES.contains(token)
}

/// Resolve a single driver reference (name, surname or code) to its three-letter code.
pub fn resolve_driver(token: &str) -> Option<String> {
    let trimmed = token.trim();
    let upper = trimmed.to_ascii_uppercase();
    if upper.len() == 3 && is_driver_code(&upper) {
        return Some(upper);
    }

    let needle = fold(trimmed);
    if needle.len() < 3 {
        return None;
    }

    if let Some((_, code)) = DRIVERS.iter().find(|(key, _)| *key == needle) {
        return Some(code.to_string());
    }

    let codes: BTreeSet<&str> = DRIVERS
        .iter()
        .filter(|(key, _)| key.contains(needle.as_str()) || needle.contains(key))
        .map(|(_, code)| *code)
        .collect();
    unique(codes).map(str::to_string)
}

/// Every driver named in free text, in order of first mention, without duplicates.
///
/// Uppercase three-letter codes are accepted as written; lowercase ones are not, since several
/// codes are ordinary English words.
pub fn find_drivers(text: &str) -> Vec<String> {
    let mut found: Vec<String> = Vec::new();
    let mut push = |code: String| {
        if !found.contains(&code) {
            found.push(code);
        }
    };

    for raw in text.split(|c: char| !c.is_alphanumeric()) {
        if raw.len() == 3 && raw.chars().all(|c| c.is_ascii_uppercase()) && is_driver_code(raw) {
            push(raw.to_string());
            continue;
        }

        let word = fold(raw);
        if word.len() < 4 || STOPWORDS.contains(&word.as_str()) {
            continue;
        }
        let codes: BTreeSet<&str> = DRIVERS
            .iter()
            .filter(|(key, _)| key.split(' ').any(|part| part == word) || (word.len() >= 5 && key.contains(word.as_str())))
            .map(|(_, code)| *code)
            .collect();
        if let Some(code) = unique(codes) {
            push(code.to_string());
        }
    }

    // multi-word keys such as "de vries"
    let folded = fold(text);
    for (key, code) in DRIVERS.iter().filter(|(key, _)| key.contains(' ')) {
        if contains_phrase(&folded, key) && !found.iter().any(|c| c == code) {
            found.push(code.to_string());
        }
    }

    found
}

/// Resolve a Grand Prix reference (event name, country, adjective or circuit).
pub fn resolve_grand_prix(token: &str) -> Option<String> {
    let needle = strip_suffix(&fold(token.trim()));
    if needle.len() < 2 {
        return None;
    }

    let exact: BTreeSet<&str> = GRANDS_PRIX
        .iter()
        .filter(|(name, aliases)| strip_suffix(&fold(name)) == needle || aliases.contains(&needle.as_str()))
        .map(|(name, _)| *name)
        .collect();
    if let Some(name) = unique(exact) {
        return Some(name.to_string());
    }

    if needle.len() < 4 {
        return None;
    }
    let partial: BTreeSet<&str> = GRANDS_PRIX
        .iter()
        .filter(|(name, aliases)| {
            let canonical = fold(name);
            canonical.contains(needle.as_str())
                || needle.contains(strip_suffix(&canonical).as_str())
                || aliases.iter().any(|a| a.len() >= 4 && needle.contains(a))
        })
        .map(|(name, _)| *name)
        .collect();
    unique(partial).map(str::to_string)
}

/// The single Grand Prix mentioned in free text, if exactly one is.
pub fn find_grand_prix(text: &str) -> Option<String> {
    let folded = fold(text);
    let mentioned: BTreeSet<&str> = GRANDS_PRIX
        .iter()
        .filter(|(name, aliases)| {
            contains_phrase(&folded, &strip_suffix(&fold(name)))
                || aliases.iter().any(|alias| contains_phrase(&folded, alias))
        })
        .map(|(name, _)| *name)
        .collect();

    // "mexico city" also mentions "mexico"; nested matches collapse to the same event, but a
    // genuine second event means the question is ambiguous.
    unique(mentioned).map(str::to_string)
}

fn strip_suffix(folded: &str) -> String {
    folded
        .trim()
        .trim_end_matches("grand prix")
        .trim_end_matches(" gp")
        .trim()
        .to_string()
}

/// Whole-word phrase match over folded text.
fn contains_phrase(folded: &str, phrase: &str) -> bool {
    if phrase.is_empty() {
        return false;
    }
    let haystack = words(folded);
    let needle = words(phrase);
    if needle.is_empty() || needle.len() > haystack.len() {
        return false;
    }
    haystack.windows(needle.len()).any(|w| w == needle.as_slice())
}

fn unique<T: Ord>(set: BTreeSet<T>) -> Option<T> {
    if set.len() == 1 {
        set.into_iter().next()
    } else {
        None
    }
}
