//! Value normalization shared by the merge engines.

use std::sync::LazyLock;

static QUANTITY: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(
        r"(?i)(\d+(?:[.,]\d+)?)\s*(kilogrammes?|kgs?|milligrammes?|mg|grammes?|grams?|gr|g|millilitres?|milliliters?|ml|centilitres?|cl|decilitres?|dl|litres?|liters?|l|oz|lbs?)\b",
    )
    .unwrap()
});

static MULTIPACK: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"(?i)(\d)\s*[x×]\s*(\d)").unwrap());

static SPACES: LazyLock<regex::Regex> = LazyLock::new(|| regex::Regex::new(r"\s+").unwrap());

static PUNCTUATION_ONLY: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"^[\s\p{P}\p{S}]*$").unwrap());

static EMB_SUFFIX: LazyLock<regex::Regex> =
    LazyLock::new(|| regex::Regex::new(r"(?i)[\s.-]*\b(?:CE|EG|EK|EY|WE|EF|EB|EC)$").unwrap());

static MODIFIER: LazyLock<regex::Regex> = LazyLock::new(|| {
    regex::Regex::new(
        r"(?i)^\s*(<=|>=|≤|≥|<|>|~|less than|more than|max(?:imum)?|min(?:imum)?|about|-)\s*",
    )
    .unwrap()
});

fn canonical_unit(unit: &str) -> &'static str {
    match unit.to_lowercase().as_str() {
        "kilogramme" | "kilogrammes" | "kg" | "kgs" => "kg",
        "milligramme" | "milligrammes" | "mg" => "mg",
        "gramme" | "grammes" | "gram" | "grams" | "gr" | "g" => "g",
        "millilitre" | "millilitres" | "milliliter" | "milliliters" | "ml" => "ml",
        "centilitre" | "centilitres" | "cl" => "cl",
        "decilitre" | "decilitres" | "dl" => "dl",
        "litre" | "litres" | "liter" | "liters" | "l" => "l",
        "lb" | "lbs" => "lb",
        _ => "oz",
    }
}

/// Canonicalize unit spellings and spacing of a quantity or serving size.
///
/// `"100gr"` becomes `"100 g"`, `"6x90g"` becomes `"6 x 90 g"` and
/// `"1.0 litre"` becomes `"1 l"`. Already canonical strings are unchanged.
pub fn canonicalize_quantity(value: &str) -> String {
    let value = value.trim();
    let value = QUANTITY.replace_all(value, |caps: &regex::Captures| {
        let number = &caps[1];
        let number = number
            .strip_suffix(".0")
            .or_else(|| number.strip_suffix(",0"))
            .unwrap_or(number);
        format!("{number} {}", canonical_unit(&caps[2]))
    });
    let value = MULTIPACK.replace_all(&value, "$1 x $2");
    SPACES.replace_all(&value, " ").into_owned()
}

/// Fold free text into a plain tag identifier.
pub fn fold_tag_id(text: &str) -> String {
    let mut id = String::with_capacity(text.len());
    for c in text.trim().to_lowercase().chars() {
        let c = fold_accent(c);
        if c.is_alphanumeric() {
            id.push(c);
        } else if !id.ends_with('-') {
            id.push('-');
        }
    }
    id.trim_matches('-').to_owned()
}

fn fold_accent(c: char) -> char {
    match c {
        'à' | 'á' | 'â' | 'ã' | 'ä' | 'å' => 'a',
        'ç' => 'c',
        'è' | 'é' | 'ê' | 'ë' => 'e',
        'ì' | 'í' | 'î' | 'ï' => 'i',
        'ñ' => 'n',
        'ò' | 'ó' | 'ô' | 'õ' | 'ö' => 'o',
        'ù' | 'ú' | 'û' | 'ü' => 'u',
        'ý' | 'ÿ' => 'y',
        c => c,
    }
}

pub fn is_punctuation_only(token: &str) -> bool {
    PUNCTUATION_ONLY.is_match(token)
}

/// Normalize a packager (health mark) code: `"fr 62.365.100 ce"` becomes `"FR 62.365.100 EC"`.
pub fn normalize_packager_code(code: &str) -> String {
    let code = SPACES.replace_all(code.trim(), " ").to_uppercase();
    if EMB_SUFFIX.is_match(&code) {
        format!("{} EC", EMB_SUFFIX.replace(&code, ""))
    } else {
        code
    }
}

/// Split a leading comparison modifier off a raw nutrient value.
pub fn parse_modifier(raw: &str) -> (Option<&'static str>, &str) {
    let Some(caps) = MODIFIER.captures(raw) else {
        return (None, raw.trim());
    };
    let modifier = match caps[1].to_lowercase().as_str() {
        "<" | "less than" | "max" | "maximum" => "<",
        "<=" | "≤" => "≤",
        ">" | "more than" | "min" | "minimum" => ">",
        ">=" | "≥" => "≥",
        "~" | "about" => "~",
        _ => "-",
    };
    let rest = raw[caps.get(0).map_or(0, |m| m.end())..].trim();
    // a lone "-" followed by digits is a negative number, not a modifier
    if modifier == "-" && !rest.is_empty() {
        return (None, raw.trim());
    }
    (Some(modifier), rest)
}

/// Normalize a numeric nutrient value, `None` when it is not a number.
pub fn normalize_number(raw: &str) -> Option<String> {
    let value: String = raw
        .trim()
        .chars()
        .filter(|c| !c.is_whitespace())
        .map(|c| if c == ',' { '.' } else { c })
        .collect();
    let value = value.strip_prefix('+').unwrap_or(&value).to_owned();
    value.parse::<f64>().ok().filter(|v| v.is_finite())?;
    Some(value)
}

pub fn normalize_nutrient_unit(unit: &str) -> String {
    let unit = unit.trim();
    match unit.to_lowercase().as_str() {
        "kj" => "kJ".to_owned(),
        "µg" | "μg" | "ug" | "mcg" => "mcg".to_owned(),
        "gr" | "grams" | "gramme" | "grammes" => "g".to_owned(),
        "%vol" | "% vol" | "% vol." | "vol%" => "% vol".to_owned(),
        other => other.to_owned(),
    }
}
