/// A parsed set of HTTP status codes, kept as inclusive ranges.
///
/// Accepts comma-separated entries in three forms: a single code (`403`),
/// an explicit range (`200-299`), or a class shorthand (`2xx`).
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StatusRanges(Vec<(u16, u16)>);

impl StatusRanges {
    pub fn parse(input: &str) -> Result<Self, String> {
        let mut out: Vec<(u16, u16)> = Vec::new();
        for part in input.split(',').map(str::trim).filter(|s| !s.is_empty()) {
            if let Some(class) = part.strip_suffix("xx") {
                let class: u16 = class
                    .parse()
                    .map_err(|_| format!("invalid status class '{part}'"))?;
                if !(1..=5).contains(&class) {
                    return Err(format!("invalid status class '{part}'"));
                }
                out.push((class * 100, class * 100 + 99));
            } else if let Some((lo, hi)) = part.split_once('-') {
                let lo: u16 = lo
                    .trim()
                    .parse()
                    .map_err(|_| format!("invalid status range '{part}'"))?;
                let hi: u16 = hi
                    .trim()
                    .parse()
                    .map_err(|_| format!("invalid status range '{part}'"))?;
                if lo > hi {
                    return Err(format!("invalid status range '{part}'"));
                }
                out.push((lo, hi));
            } else {
                let v: u16 = part
                    .parse()
                    .map_err(|_| format!("invalid status code '{part}'"))?;
                out.push((v, v));
            }
        }
        Ok(Self(out))
    }

    pub fn from_ranges(ranges: Vec<(u16, u16)>) -> Self {
        Self(ranges)
    }

    pub fn contains(&self, status: u16) -> bool {
        self.0.iter().any(|(lo, hi)| status >= *lo && status <= *hi)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

pub fn parse_csv(input: &str) -> Vec<String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

pub fn parse_usize_csv(input: &str) -> Result<Vec<usize>, String> {
    input
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<usize>()
                .map_err(|_| format!("invalid number '{s}'"))
        })
        .collect()
}

/// Joins a base URL and a candidate path with exactly one slash between
/// them.
pub fn join_url(base: &str, path: &str) -> String {
    let base = base.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    format!("{base}/{path}")
}

/// Extensions are accepted with or without a leading dot.
pub fn parse_extensions_csv(input: &str) -> Result<Vec<String>, String> {
    let mut out = Vec::new();
    for part in input.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let ext = part.trim_start_matches('.');
        if ext.is_empty() || ext.contains('/') {
            return Err(format!("invalid extension '{part}'"));
        }
        out.push(ext.to_string());
    }
    Ok(out)
}
