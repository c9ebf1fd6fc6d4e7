use chrono::{Datelike, Duration, NaiveDate, NaiveDateTime, NaiveTime};
use once_cell::sync::Lazy;
use regex::Regex;

static TIME_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(\d{1,2})(?:[:.h](\d{2}))?\s*(am|pm|uhr|h)?\b").expect("valid time regex")
});
static PRICE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(\d+)(?:[.,](\d{1,2}))?").expect("valid price regex"));
static YEAR_FIELD_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"%[-_0^#]?[YyCGg]").expect("valid year field regex"));

/// Year-less dates further back than this are assumed to belong to next year.
const YEAR_ROLLOVER_DAYS: i64 = 180;

pub fn clean_text(input: &str) -> String {
    input.split_whitespace().collect::<Vec<_>>().join(" ")
}

pub fn non_empty(input: String) -> Option<String> {
    if input.is_empty() {
        None
    } else {
        Some(input)
    }
}

pub fn split_genres(text: &str) -> Vec<String> {
    text.split([',', '/', '|'])
        .map(clean_text)
        .filter(|s| !s.is_empty())
        .collect()
}

/// Parses `7pm`, `7:30 PM`, `19:30`, `20.00 Uhr`.
pub fn parse_time(text: &str) -> Option<NaiveTime> {
    let cleaned = clean_text(text);
    for caps in TIME_RE.captures_iter(&cleaned) {
        let hour: u32 = caps.get(1)?.as_str().parse().ok()?;
        let minute: u32 = caps
            .get(2)
            .and_then(|m| m.as_str().parse().ok())
            .unwrap_or(0);
        let suffix = caps.get(3).map(|m| m.as_str().to_lowercase());
        let hour = match suffix.as_deref() {
            Some("pm") if hour < 12 => hour + 12,
            Some("am") if hour == 12 => 0,
            _ => hour,
        };
        // a bare number without minutes or suffix is not a time
        if caps.get(2).is_none() && suffix.is_none() {
            continue;
        }
        if let Some(time) = NaiveTime::from_hms_opt(hour, minute, 0) {
            return Some(time);
        }
    }
    None
}

/// Every amount in the given texts converted to cents.
pub fn price_cents(texts: &[&str]) -> Vec<i64> {
    texts
        .iter()
        .flat_map(|text| PRICE_RE.captures_iter(text))
        .filter_map(|caps| {
            let units: i64 = caps.get(1)?.as_str().parse().ok()?;
            let cents: i64 = match caps.get(2).map(|m| m.as_str()) {
                Some(frac) if frac.len() == 1 => frac.parse::<i64>().ok()? * 10,
                Some(frac) => frac.parse().ok()?,
                None => 0,
            };
            Some(units * 100 + cents)
        })
        .collect()
}

const CULTURE_NAMES: &[(&str, &[(&str, &str)])] = &[
    (
        "de",
        &[
            ("januar", "January"),
            ("jänner", "January"),
            ("februar", "February"),
            ("märz", "March"),
            ("maerz", "March"),
            ("april", "April"),
            ("mai", "May"),
            ("juni", "June"),
            ("juli", "July"),
            ("august", "August"),
            ("september", "September"),
            ("oktober", "October"),
            ("november", "November"),
            ("dezember", "December"),
            ("montag", "Monday"),
            ("dienstag", "Tuesday"),
            ("mittwoch", "Wednesday"),
            ("donnerstag", "Thursday"),
            ("freitag", "Friday"),
            ("samstag", "Saturday"),
            ("sonnabend", "Saturday"),
            ("sonntag", "Sunday"),
            ("mär", "Mar"),
            ("mrz", "Mar"),
            ("okt", "Oct"),
            ("dez", "Dec"),
            ("mo", "Mon"),
            ("di", "Tue"),
            ("mi", "Wed"),
            ("do", "Thu"),
            ("fr", "Fri"),
            ("sa", "Sat"),
            ("so", "Sun"),
        ],
    ),
    (
        "fr",
        &[
            ("janvier", "January"),
            ("février", "February"),
            ("fevrier", "February"),
            ("mars", "March"),
            ("avril", "April"),
            ("mai", "May"),
            ("juin", "June"),
            ("juillet", "July"),
            ("août", "August"),
            ("aout", "August"),
            ("septembre", "September"),
            ("octobre", "October"),
            ("novembre", "November"),
            ("décembre", "December"),
            ("decembre", "December"),
            ("lundi", "Monday"),
            ("mardi", "Tuesday"),
            ("mercredi", "Wednesday"),
            ("jeudi", "Thursday"),
            ("vendredi", "Friday"),
            ("samedi", "Saturday"),
            ("dimanche", "Sunday"),
        ],
    ),
    (
        "nl",
        &[
            ("januari", "January"),
            ("februari", "February"),
            ("maart", "March"),
            ("april", "April"),
            ("mei", "May"),
            ("juni", "June"),
            ("juli", "July"),
            ("augustus", "August"),
            ("september", "September"),
            ("oktober", "October"),
            ("november", "November"),
            ("december", "December"),
            ("maandag", "Monday"),
            ("dinsdag", "Tuesday"),
            ("woensdag", "Wednesday"),
            ("donderdag", "Thursday"),
            ("vrijdag", "Friday"),
            ("zaterdag", "Saturday"),
            ("zondag", "Sunday"),
        ],
    ),
    (
        "es",
        &[
            ("enero", "January"),
            ("febrero", "February"),
            ("marzo", "March"),
            ("abril", "April"),
            ("mayo", "May"),
            ("junio", "June"),
            ("julio", "July"),
            ("agosto", "August"),
            ("septiembre", "September"),
            ("octubre", "October"),
            ("noviembre", "November"),
            ("diciembre", "December"),
            ("lunes", "Monday"),
            ("martes", "Tuesday"),
            ("miércoles", "Wednesday"),
            ("jueves", "Thursday"),
            ("viernes", "Friday"),
            ("sábado", "Saturday"),
            ("domingo", "Sunday"),
        ],
    ),
    (
        "it",
        &[
            ("gennaio", "January"),
            ("febbraio", "February"),
            ("marzo", "March"),
            ("aprile", "April"),
            ("maggio", "May"),
            ("giugno", "June"),
            ("luglio", "July"),
            ("agosto", "August"),
            ("settembre", "September"),
            ("ottobre", "October"),
            ("novembre", "November"),
            ("dicembre", "December"),
            ("lunedì", "Monday"),
            ("martedì", "Tuesday"),
            ("mercoledì", "Wednesday"),
            ("giovedì", "Thursday"),
            ("venerdì", "Friday"),
            ("sabato", "Saturday"),
            ("domenica", "Sunday"),
        ],
    ),
];

/// Rewrites localized month and weekday names to English so chrono can read them.
pub fn localize_to_english(input: &str, culture: Option<&str>) -> String {
    let Some(culture) = culture else {
        return input.to_string();
    };
    let language = culture
        .split(['-', '_'])
        .next()
        .unwrap_or_default()
        .to_lowercase();
    let Some((_, names)) = CULTURE_NAMES.iter().find(|(tag, _)| *tag == language) else {
        return input.to_string();
    };
    input
        .split_inclusive(|c: char| !c.is_alphabetic())
        .map(|chunk| {
            let word_len = chunk
                .char_indices()
                .find(|(_, c)| !c.is_alphabetic())
                .map_or(chunk.len(), |(i, _)| i);
            let (word, rest) = chunk.split_at(word_len);
            let lower = word.to_lowercase();
            match names.iter().find(|(local, _)| *local == lower) {
                Some((_, english)) => format!("{english}{rest}"),
                None => chunk.to_string(),
            }
        })
        .collect()
}

const FALLBACK_FORMATS: &[&str] = &[
    "%Y-%m-%d",
    "%d.%m.%Y",
    "%m/%d/%Y",
    "%m/%d/%y",
    "%A %m/%d/%Y",
    "%B %d, %Y",
    "%b %d, %Y",
    "%a %b %d, %Y",
    "%A, %B %d, %Y",
    "%d %B %Y",
    "%d %b %Y",
    "%B %d",
    "%b %d",
    "%d.%m.",
];

/// Parses `input` with an explicit chrono format, or tries the fallback list.
pub fn parse_date(
    input: &str,
    format: Option<&str>,
    culture: Option<&str>,
    today: NaiveDate,
) -> Option<NaiveDate> {
    let text = clean_text(&localize_to_english(input, culture));
    if text.is_empty() {
        return None;
    }
    match format {
        Some(format) => parse_with_format(&text, format, today),
        None => FALLBACK_FORMATS
            .iter()
            .find_map(|format| parse_with_format(&text, format, today)),
    }
}

fn parse_with_format(text: &str, format: &str, today: NaiveDate) -> Option<NaiveDate> {
    if YEAR_FIELD_RE.is_match(format) {
        return NaiveDate::parse_from_str(text, format)
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(text, format)
                    .ok()
                    .map(|dt| dt.date())
            });
    }

    // chrono refuses dates without a year and checks weekdays against the
    // supplied one, so each candidate year is parsed separately
    let format_with_year = format!("{format} %Y");
    let in_year = |year: i32| {
        let with_year = format!("{text} {year}");
        NaiveDate::parse_from_str(&with_year, &format_with_year)
            .ok()
            .or_else(|| {
                NaiveDateTime::parse_from_str(&with_year, &format_with_year)
                    .ok()
                    .map(|dt| dt.date())
            })
    };
    let recent = |date: &NaiveDate| {
        today.signed_duration_since(*date) <= Duration::days(YEAR_ROLLOVER_DAYS)
    };
    match in_year(today.year()) {
        Some(date) if recent(&date) => Some(date),
        current => in_year(today.year() + 1).or(current),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2026, 10, 14).unwrap()
    }

    #[test]
    fn cleans_whitespace_runs() {
        assert_eq!(clean_text("  Nile,\n\t Cryptopsy  "), "Nile, Cryptopsy");
    }

    #[test]
    fn parses_common_time_shapes() {
        assert_eq!(parse_time("DOORS: 7pm"), NaiveTime::from_hms_opt(19, 0, 0));
        assert_eq!(parse_time("Show: 6:30 pm"), NaiveTime::from_hms_opt(18, 30, 0));
        assert_eq!(parse_time("Beginn 20.00 Uhr"), NaiveTime::from_hms_opt(20, 0, 0));
        assert_eq!(parse_time("Einlass 19:30"), NaiveTime::from_hms_opt(19, 30, 0));
        assert_eq!(parse_time("12 am"), NaiveTime::from_hms_opt(0, 0, 0));
        assert_eq!(parse_time("Room 101"), None);
    }

    #[test]
    fn collects_price_amounts() {
        assert_eq!(price_cents(&["VVK 18,50 €", "AK 22 €"]), vec![1850, 2200]);
        assert_eq!(price_cents(&["$15.5"]), vec![1550]);
        assert!(price_cents(&["free"]).is_empty());
    }

    #[test]
    fn splits_genre_lists() {
        assert_eq!(split_genres("Punk / Rock, Indie|"), vec!["Punk", "Rock", "Indie"]);
    }

    #[test]
    fn parses_explicit_formats() {
        assert_eq!(
            parse_date("08.10.2026", Some("%d.%m.%Y"), None, today()),
            NaiveDate::from_ymd_opt(2026, 10, 8)
        );
        assert_eq!(
            parse_date("Tue Oct 7, 2025", Some("%a %b %e, %Y"), None, today()),
            NaiveDate::from_ymd_opt(2025, 10, 7)
        );
        assert_eq!(
            parse_date("2026-11-02 20:00", Some("%Y-%m-%d %H:%M"), None, today()),
            NaiveDate::from_ymd_opt(2026, 11, 2)
        );
        assert_eq!(parse_date("soon", Some("%d.%m.%Y"), None, today()), None);
    }

    #[test]
    fn translates_culture_names() {
        assert_eq!(
            parse_date("Freitag, 6. November 2026", Some("%A, %d. %B %Y"), Some("de-DE"), today()),
            NaiveDate::from_ymd_opt(2026, 11, 6)
        );
        assert_eq!(
            parse_date("12 décembre 2026", Some("%d %B %Y"), Some("fr"), today()),
            NaiveDate::from_ymd_opt(2026, 12, 12)
        );
    }

    #[test]
    fn year_less_dates_roll_over() {
        assert_eq!(
            parse_date("October 5", None, None, today()),
            NaiveDate::from_ymd_opt(2026, 10, 5)
        );
        assert_eq!(
            parse_date("January 9", None, None, today()),
            NaiveDate::from_ymd_opt(2027, 1, 9)
        );
        assert_eq!(
            parse_date("17.10.", None, None, today()),
            NaiveDate::from_ymd_opt(2026, 10, 17)
        );
    }

    #[test]
    fn year_less_weekday_dates_use_the_matching_year() {
        assert_eq!(
            parse_date("Sat Jan 9", Some("%a %b %d"), None, today()),
            NaiveDate::from_ymd_opt(2027, 1, 9)
        );
        assert_eq!(
            parse_date("Fri Oct 16", Some("%a %b %d"), None, today()),
            NaiveDate::from_ymd_opt(2026, 10, 16)
        );
        // weekday that fits neither year
        assert_eq!(parse_date("Mon Jan 9", Some("%a %b %d"), None, today()), None);
    }

    #[test]
    fn german_abbreviated_months() {
        assert_eq!(
            parse_date("14. Mär 2027", Some("%d. %b %Y"), Some("de"), today()),
            NaiveDate::from_ymd_opt(2027, 3, 14)
        );
        assert_eq!(
            parse_date("3. Dez", Some("%d. %b"), Some("de-AT"), today()),
            NaiveDate::from_ymd_opt(2026, 12, 3)
        );
    }

    #[test]
    fn falls_back_to_known_formats() {
        assert_eq!(
            parse_date("10/8/2025", None, None, today()),
            NaiveDate::from_ymd_opt(2025, 10, 8)
        );
    }
}
