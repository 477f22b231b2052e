/*
 *  Copyright 2025-2026 Colliery Software
 *
 *  Licensed under the Apache License, Version 2.0 (the "License");
 *  you may not use this file except in compliance with the License.
 *  You may obtain a copy of the License at
 *
 *      http://www.apache.org/licenses/LICENSE-2.0
 *
 *  Unless required by applicable law or agreed to in writing, software
 *  distributed under the License is distributed on an "AS IS" BASIS,
 *  WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
 *  See the License for the specific language governing permissions and
 *  limitations under the License.
 */

//! # Generator Catalog
//!
//! Fixed registry of fake-data generators reachable from `${func(...)}`
//! placeholders and from scripted steps. The catalog is enumerable
//! ([`list_generators`]) so UIs can render the available functions, and
//! callable by name ([`call_generator`]) with keyword arguments parsed
//! from the placeholder body.

use std::collections::{BTreeMap, HashMap};

use chrono::{Datelike, Duration, Local, NaiveDate, NaiveDateTime, Timelike};
use once_cell::sync::Lazy;
use rand::seq::SliceRandom;
use rand::Rng;
use serde::Serialize;
use serde_json::{json, Value};
use uuid::Uuid;

use crate::error::StepError;

type Kwargs = BTreeMap<String, Value>;
type GeneratorFn = fn(&Kwargs) -> Result<Value, StepError>;

struct Generator {
    description: &'static str,
    func: GeneratorFn,
}

/// `{name, description}` pair returned by the catalog introspection call.
#[derive(Debug, Clone, Serialize)]
pub struct GeneratorInfo {
    pub name: String,
    pub description: String,
}

macro_rules! catalog {
    ($( $name:literal => ($desc:literal, $func:path), )*) => {{
        let mut map: HashMap<&'static str, Generator> = HashMap::new();
        $( map.insert($name, Generator { description: $desc, func: $func }); )*
        map
    }};
}

static CATALOG: Lazy<HashMap<&'static str, Generator>> = Lazy::new(|| {
    let entries = catalog! {
        "generate_country" => ("Random country name", gen_country),
        "generate_province" => ("Random province name", gen_province),
        "generate_city" => ("Random city name", gen_city),
        "generate_district" => ("Random district name", gen_district),
        "generate_address" => ("Random street address", gen_address),
        "generate_company" => ("Random company name", gen_company),
        "generate_name" => ("Random person name", gen_name),
        "generate_email" => ("Random email address", gen_email),
        "generate_phone" => ("Random mobile number", gen_phone),
        "generate_job" => ("Random job title", gen_job),
        "generate_bank_account_number" => ("Random bank card number", gen_bank_account_number),
        "generate_ident_card_number" => ("National id for an 18-65 year old", gen_ident_card_number),
        "generate_ident_card_number_condition" => ("National id within [min_age, max_age]", gen_ident_card_number_condition),
        "generate_ident_card_birthday" => ("Birth date slice of a national id", gen_ident_card_birthday),
        "generate_ident_card_gender" => ("Gender derived from a national id", gen_ident_card_gender),
        "generate_random_number" => ("Random integer in [min, max]", gen_random_number),
        "generate_string" => ("Random string of the given length (digit/char flags)", gen_string),
        "generate_uuid" => ("Random UUID v4", gen_uuid),
        "generate_timestamp" => ("Current unix timestamp in microseconds", gen_timestamp),
        "generate_datetime" => ("Now plus offsets, optionally formatted (fmt code or pattern)", gen_datetime),
        "generate_week_number" => ("ISO week number of today", gen_week_number),
        "generate_week_name" => ("Weekday name of today", gen_week_name),
        "generate_day" => ("Day of year of today", gen_day),
        "generate_am_or_pm" => ("AM or PM for the current time", gen_am_or_pm),
        "generate_global_serial_number" => ("28-digit serial: timestamp + 9999 + random digits", gen_global_serial_number),
        "generate_seconds_until" => ("Seconds from now until now + offsets (floored at 0)", gen_seconds_until),
        "generate_information" => ("A full fake person profile as an object", gen_information),
    };
    entries
});

/// Enumerates the catalog, sorted by name.
pub fn list_generators() -> Vec<GeneratorInfo> {
    let mut all: Vec<GeneratorInfo> = CATALOG
        .iter()
        .map(|(name, generator)| GeneratorInfo {
            name: name.to_string(),
            description: generator.description.to_string(),
        })
        .collect();
    all.sort_by(|a, b| a.name.cmp(&b.name));
    all
}

pub fn has_generator(name: &str) -> bool {
    CATALOG.contains_key(name)
}

/// Calls a generator by name with parsed keyword arguments.
pub fn call_generator(name: &str, kwargs: &Kwargs) -> Result<Value, StepError> {
    let generator = CATALOG
        .get(name)
        .ok_or_else(|| StepError::parameter(format!("unknown generator function: {name}")))?;
    (generator.func)(kwargs)
}

/// Parses a placeholder body of the form `func_name(k1=v1, k2=v2)`.
///
/// Returns `None` when the content is not a call at all. Argument values
/// are scalar literals: JSON literals parse as themselves, quoted strings
/// lose their quotes, anything else stays a bare string.
pub fn parse_call(content: &str) -> Option<(String, Kwargs)> {
    let content = content.trim();
    if !content.ends_with(')') {
        return None;
    }
    let open = content.find('(')?;
    let name = content[..open].trim();
    if name.is_empty() {
        return None;
    }
    let body = content[open + 1..content.len() - 1].trim();
    let mut kwargs = Kwargs::new();
    if !body.is_empty() {
        for piece in body.split(',') {
            let (key, raw) = piece.split_once('=')?;
            kwargs.insert(key.trim().to_string(), parse_scalar(raw.trim()));
        }
    }
    Some((name.to_string(), kwargs))
}

fn parse_scalar(raw: &str) -> Value {
    if (raw.starts_with('\'') && raw.ends_with('\'') && raw.len() >= 2)
        || (raw.starts_with('"') && raw.ends_with('"') && raw.len() >= 2)
    {
        return Value::String(raw[1..raw.len() - 1].to_string());
    }
    match raw {
        "True" => return Value::Bool(true),
        "False" => return Value::Bool(false),
        "None" => return Value::Null,
        _ => {}
    }
    serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string()))
}

fn kw_i64(kwargs: &Kwargs, key: &str) -> Option<i64> {
    match kwargs.get(key)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.parse().ok(),
        _ => None,
    }
}

fn kw_bool(kwargs: &Kwargs, key: &str) -> bool {
    matches!(kwargs.get(key), Some(Value::Bool(true)))
}

fn kw_str<'k>(kwargs: &'k Kwargs, key: &str) -> Option<&'k str> {
    kwargs.get(key).and_then(Value::as_str)
}

fn pick(pool: &[&str]) -> String {
    let mut rng = rand::thread_rng();
    pool.choose(&mut rng).copied().unwrap_or_default().to_string()
}

const COUNTRIES: &[&str] = &[
    "United States", "Germany", "Japan", "Brazil", "Canada", "France", "Australia", "India",
    "Singapore", "Netherlands", "Sweden", "South Korea",
];
const PROVINCES: &[&str] = &[
    "Bavaria", "Ontario", "Queensland", "Catalonia", "Hokkaido", "Gauteng", "Normandy",
    "Tuscany", "Uppland", "Gyeonggi",
];
const CITIES: &[&str] = &[
    "Springfield", "Riverton", "Lakewood", "Fairview", "Brookhaven", "Milton", "Ashford",
    "Granville", "Kingsport", "Harborview",
];
const DISTRICTS: &[&str] = &[
    "North End", "Old Town", "Harbor District", "Midtown", "Garden Quarter", "East Side",
    "Civic Center", "Riverside",
];
const STREETS: &[&str] = &[
    "Maple Street", "Oak Avenue", "Cedar Lane", "Elm Drive", "Willow Road", "Birch Boulevard",
    "Chestnut Court", "Juniper Way",
];
const COMPANIES: &[&str] = &[
    "Northwind Trading", "Acme Logistics", "Bluepeak Systems", "Granite Works", "Helios Labs",
    "Ironwood Holdings", "Cascade Retail", "Vertex Analytics",
];
const FIRST_NAMES: &[&str] = &[
    "Alex", "Jordan", "Taylor", "Morgan", "Casey", "Riley", "Quinn", "Avery", "Dana", "Robin",
    "Jamie", "Cameron",
];
const LAST_NAMES: &[&str] = &[
    "Smith", "Keller", "Nakamura", "Olsen", "Ferrari", "Novak", "Silva", "Haines", "Berg",
    "Marsh", "Iqbal", "Duran",
];
const JOBS: &[&str] = &[
    "QA Engineer", "Release Manager", "Data Analyst", "Product Designer", "Site Reliability Engineer",
    "Accountant", "Procurement Lead", "Support Specialist",
];
const EMAIL_DOMAINS: &[&str] = &["example.com", "example.org", "mail.test", "inbox.test"];
const WEEKDAYS: &[&str] = &[
    "Monday", "Tuesday", "Wednesday", "Thursday", "Friday", "Saturday", "Sunday",
];

fn gen_country(_: &Kwargs) -> Result<Value, StepError> {
    Ok(json!(pick(COUNTRIES)))
}

fn gen_province(_: &Kwargs) -> Result<Value, StepError> {
    Ok(json!(pick(PROVINCES)))
}

fn gen_city(_: &Kwargs) -> Result<Value, StepError> {
    Ok(json!(pick(CITIES)))
}

fn gen_district(_: &Kwargs) -> Result<Value, StepError> {
    Ok(json!(pick(DISTRICTS)))
}

fn gen_address(_: &Kwargs) -> Result<Value, StepError> {
    let number = rand::thread_rng().gen_range(1..=9999);
    Ok(json!(format!("{} {}, {}", number, pick(STREETS), pick(CITIES))))
}

fn gen_company(_: &Kwargs) -> Result<Value, StepError> {
    Ok(json!(pick(COMPANIES)))
}

fn gen_name(_: &Kwargs) -> Result<Value, StepError> {
    Ok(json!(format!("{} {}", pick(FIRST_NAMES), pick(LAST_NAMES))))
}

fn gen_email(_: &Kwargs) -> Result<Value, StepError> {
    let user = format!(
        "{}.{}{}",
        pick(FIRST_NAMES).to_lowercase(),
        pick(LAST_NAMES).to_lowercase(),
        rand::thread_rng().gen_range(10..100)
    );
    Ok(json!(format!("{}@{}", user, pick(EMAIL_DOMAINS))))
}

fn gen_phone(_: &Kwargs) -> Result<Value, StepError> {
    let mut rng = rand::thread_rng();
    let mut digits = String::from("1");
    digits.push(char::from(b'3' + rng.gen_range(0..6)));
    for _ in 0..9 {
        digits.push(char::from(b'0' + rng.gen_range(0..10)));
    }
    Ok(json!(digits))
}

fn gen_job(_: &Kwargs) -> Result<Value, StepError> {
    Ok(json!(pick(JOBS)))
}

fn gen_bank_account_number(_: &Kwargs) -> Result<Value, StepError> {
    let mut rng = rand::thread_rng();
    let mut digits = String::from("62");
    for _ in 0..14 {
        digits.push(char::from(b'0' + rng.gen_range(0..10)));
    }
    Ok(json!(digits))
}

/// 18 characters: 6 region + 8 birth date + 3 sequence + 1 check, so the
/// birthday/gender derivations can slice it the usual way.
fn ident_card_for_ages(min_age: i64, max_age: i64) -> Result<String, StepError> {
    if min_age < 0 || max_age < min_age {
        return Err(StepError::parameter(format!(
            "invalid age range: min_age={min_age}, max_age={max_age}"
        )));
    }
    let mut rng = rand::thread_rng();
    let today = Local::now().date_naive();
    let age = rng.gen_range(min_age..=max_age);
    let year = today.year() - age as i32;
    let month = rng.gen_range(1..=12u32);
    let day = rng.gen_range(1..=28u32);
    let birth = NaiveDate::from_ymd_opt(year, month, day)
        .ok_or_else(|| StepError::unknown("birth date out of range"))?;
    let region = rng.gen_range(110000..=659000);
    let sequence = rng.gen_range(0..1000);
    let check = rng.gen_range(0..10);
    Ok(format!(
        "{region:06}{}{sequence:03}{check}",
        birth.format("%Y%m%d")
    ))
}

fn gen_ident_card_number(_: &Kwargs) -> Result<Value, StepError> {
    Ok(json!(ident_card_for_ages(18, 65)?))
}

fn gen_ident_card_number_condition(kwargs: &Kwargs) -> Result<Value, StepError> {
    let min_age = kw_i64(kwargs, "min_age").unwrap_or(18);
    let max_age = kw_i64(kwargs, "max_age").unwrap_or(65);
    Ok(json!(ident_card_for_ages(min_age, max_age)?))
}

fn gen_ident_card_birthday(kwargs: &Kwargs) -> Result<Value, StepError> {
    let id = kw_str(kwargs, "ident_card_number")
        .ok_or_else(|| StepError::parameter("ident_card_number is required"))?;
    if id.len() < 18 {
        return Err(StepError::parameter("ident_card_number must be 18 characters"));
    }
    Ok(json!(id[6..id.len() - 4].to_string()))
}

fn gen_ident_card_gender(kwargs: &Kwargs) -> Result<Value, StepError> {
    let id = kw_str(kwargs, "ident_card_number")
        .ok_or_else(|| StepError::parameter("ident_card_number is required"))?;
    let digit = id
        .chars()
        .rev()
        .nth(1)
        .and_then(|c| c.to_digit(10))
        .ok_or_else(|| StepError::parameter("ident_card_number must end in digits"))?;
    Ok(json!(if digit % 2 == 0 { "female" } else { "male" }))
}

fn gen_random_number(kwargs: &Kwargs) -> Result<Value, StepError> {
    let min = kw_i64(kwargs, "min").unwrap_or(0);
    let max = kw_i64(kwargs, "max").unwrap_or(9);
    if max < min {
        return Err(StepError::parameter(format!(
            "invalid range: min={min}, max={max}"
        )));
    }
    Ok(json!(rand::thread_rng().gen_range(min..=max)))
}

fn gen_string(kwargs: &Kwargs) -> Result<Value, StepError> {
    let length = kw_i64(kwargs, "length")
        .ok_or_else(|| StepError::parameter("length is required"))?;
    if length <= 0 {
        return Err(StepError::parameter(format!("length must be positive: {length}")));
    }
    let digit = kw_bool(kwargs, "digit");
    let chars = kw_bool(kwargs, "char");
    let mut alphabet: Vec<char> = Vec::new();
    if digit || !chars {
        alphabet.extend('0'..='9');
    }
    if chars {
        alphabet.extend('a'..='z');
        alphabet.extend('A'..='Z');
    }
    let mut rng = rand::thread_rng();
    let out: String = (0..length)
        .map(|_| *alphabet.choose(&mut rng).unwrap_or(&'0'))
        .collect();
    Ok(json!(out))
}

fn gen_uuid(_: &Kwargs) -> Result<Value, StepError> {
    Ok(json!(Uuid::new_v4().to_string()))
}

fn gen_timestamp(_: &Kwargs) -> Result<Value, StepError> {
    Ok(json!(Local::now().timestamp_micros()))
}

/// Shifts `base` by whole months, clamping the day into the target month.
fn add_months(base: NaiveDateTime, months: i64) -> NaiveDateTime {
    let total = base.year() as i64 * 12 + base.month() as i64 - 1 + months;
    let year = (total.div_euclid(12)) as i32;
    let month = (total.rem_euclid(12) + 1) as u32;
    let last_day = match month {
        1 | 3 | 5 | 7 | 8 | 10 | 12 => 31,
        4 | 6 | 9 | 11 => 30,
        _ => {
            if (year % 4 == 0 && year % 100 != 0) || year % 400 == 0 {
                29
            } else {
                28
            }
        }
    };
    let day = base.day().min(last_day);
    NaiveDate::from_ymd_opt(year, month, day)
        .unwrap_or(base.date())
        .and_time(base.time())
}

fn datetime_with_offsets(kwargs: &Kwargs) -> NaiveDateTime {
    let mut now = Local::now().naive_local();
    if !kw_bool(kwargs, "isMicrosecond") {
        now = now.with_nanosecond(0).unwrap_or(now);
    }
    let months = kw_i64(kwargs, "year").unwrap_or(0) * 12 + kw_i64(kwargs, "month").unwrap_or(0);
    let mut shifted = add_months(now, months);
    shifted += Duration::days(kw_i64(kwargs, "day").unwrap_or(0));
    shifted += Duration::hours(kw_i64(kwargs, "hour").unwrap_or(0));
    shifted += Duration::minutes(kw_i64(kwargs, "minute").unwrap_or(0));
    shifted += Duration::seconds(kw_i64(kwargs, "second").unwrap_or(0));
    shifted
}

fn format_code(code: i64) -> Option<&'static str> {
    Some(match code {
        11 => "%Y",
        12 => "%m",
        13 => "%d",
        14 => "%H",
        15 => "%M",
        16 => "%S",
        21 => "%Y%m%d",
        22 | 23 => "%Y-%m-%d",
        31 => "%H%M%S",
        32 | 33 => "%H:%M:%S",
        41 => "%Y%m%d%H%M%S",
        42 | 44 => "%Y-%m-%d %H:%M:%S",
        43 => "%Y/%m/%d %H:%M:%S",
        51 => "%Y%m%d%H%M%S%f",
        52 | 54 => "%Y-%m-%d %H:%M:%S:%f",
        53 => "%Y/%m/%d %H:%M:%S:%f",
        _ => return None,
    })
}

fn gen_datetime(kwargs: &Kwargs) -> Result<Value, StepError> {
    let shifted = datetime_with_offsets(kwargs);
    let pattern = match kwargs.get("fmt") {
        Some(Value::Number(n)) => {
            let code = n.as_i64().unwrap_or(0);
            format_code(code)
                .ok_or_else(|| StepError::parameter(format!("unknown datetime format code: {code}")))?
                .to_string()
        }
        Some(Value::String(custom)) => custom.clone(),
        _ => "%Y-%m-%d %H:%M:%S".to_string(),
    };
    Ok(json!(shifted.format(&pattern).to_string()))
}

fn gen_week_number(_: &Kwargs) -> Result<Value, StepError> {
    Ok(json!(Local::now().iso_week().week()))
}

fn gen_week_name(_: &Kwargs) -> Result<Value, StepError> {
    let index = Local::now().weekday().num_days_from_monday() as usize;
    Ok(json!(WEEKDAYS[index]))
}

fn gen_day(_: &Kwargs) -> Result<Value, StepError> {
    Ok(json!(Local::now().ordinal()))
}

fn gen_am_or_pm(_: &Kwargs) -> Result<Value, StepError> {
    Ok(json!(if Local::now().hour() < 12 { "AM" } else { "PM" }))
}

fn gen_global_serial_number(_: &Kwargs) -> Result<Value, StepError> {
    let stamp = Local::now().format("%Y%m%d%H%M%S%3f").to_string();
    let mut rng = rand::thread_rng();
    let suffix: String = (0..4)
        .map(|_| char::from(b'0' + rng.gen_range(0..10)))
        .collect();
    Ok(json!(format!("{stamp}9999{suffix}")))
}

fn gen_seconds_until(kwargs: &Kwargs) -> Result<Value, StepError> {
    let target = datetime_with_offsets(kwargs);
    let now = Local::now().naive_local();
    let seconds = (target - now).num_seconds().max(0);
    Ok(json!(seconds))
}

fn gen_information(kwargs: &Kwargs) -> Result<Value, StepError> {
    let min_age = kw_i64(kwargs, "minAge").unwrap_or(18);
    let max_age = kw_i64(kwargs, "maxAge").unwrap_or(65);
    let ssn = ident_card_for_ages(min_age, max_age)?;
    let birthday = ssn[6..14].to_string();
    let gender_args: Kwargs =
        BTreeMap::from([("ident_card_number".to_string(), json!(ssn.clone()))]);
    let age = Local::now().year() - birthday[..4].parse::<i32>().unwrap_or(Local::now().year());
    Ok(json!({
        "name": gen_name(kwargs)?,
        "age": age.to_string(),
        "gender": gen_ident_card_gender(&gender_args)?,
        "ssn": ssn,
        "card": gen_bank_account_number(kwargs)?,
        "phone": gen_phone(kwargs)?,
        "email": gen_email(kwargs)?,
        "address": gen_address(kwargs)?,
        "company": gen_company(kwargs)?,
        "job": gen_job(kwargs)?,
        "birthday1": birthday,
        "birthday2": format!("{}-{}-{}", &birthday[..4], &birthday[4..6], &birthday[6..8]),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_catalog_is_enumerable() {
        let listing = list_generators();
        assert!(listing.len() >= 20);
        assert!(listing.iter().any(|g| g.name == "generate_uuid"));
        assert!(listing.windows(2).all(|w| w[0].name <= w[1].name));
    }

    #[test]
    fn test_parse_call_with_kwargs() {
        let (name, kwargs) = parse_call("generate_string(length=8, digit=True)").unwrap();
        assert_eq!(name, "generate_string");
        assert_eq!(kwargs.get("length"), Some(&json!(8)));
        assert_eq!(kwargs.get("digit"), Some(&json!(true)));
    }

    #[test]
    fn test_parse_call_rejects_non_calls() {
        assert!(parse_call("just_a_variable").is_none());
        assert!(parse_call("()").is_none());
    }

    #[test]
    fn test_generate_string_respects_length() {
        let kwargs = BTreeMap::from([("length".to_string(), json!(12))]);
        let out = call_generator("generate_string", &kwargs).unwrap();
        assert_eq!(out.as_str().unwrap().len(), 12);
    }

    #[test]
    fn test_generate_random_number_stays_in_range() {
        let kwargs = BTreeMap::from([
            ("min".to_string(), json!(5)),
            ("max".to_string(), json!(7)),
        ]);
        for _ in 0..50 {
            let n = call_generator("generate_random_number", &kwargs)
                .unwrap()
                .as_i64()
                .unwrap();
            assert!((5..=7).contains(&n));
        }
    }

    #[test]
    fn test_ident_card_slices_agree() {
        let id = call_generator("generate_ident_card_number", &Kwargs::new()).unwrap();
        let id = id.as_str().unwrap().to_string();
        assert_eq!(id.len(), 18);
        let kwargs = BTreeMap::from([("ident_card_number".to_string(), json!(id.clone()))]);
        let birthday = call_generator("generate_ident_card_birthday", &kwargs).unwrap();
        assert_eq!(birthday.as_str().unwrap(), &id[6..14]);
        let gender = call_generator("generate_ident_card_gender", &kwargs).unwrap();
        assert!(matches!(gender.as_str().unwrap(), "male" | "female"));
    }

    #[test]
    fn test_unknown_generator_is_an_error() {
        assert!(call_generator("no_such_generator", &Kwargs::new()).is_err());
    }

    #[test]
    fn test_generate_datetime_with_code_and_offset() {
        let kwargs = BTreeMap::from([("fmt".to_string(), json!(11))]);
        let year = call_generator("generate_datetime", &kwargs).unwrap();
        assert_eq!(year.as_str().unwrap().len(), 4);

        let kwargs = BTreeMap::from([
            ("fmt".to_string(), json!(11)),
            ("year".to_string(), json!(-1)),
        ]);
        let last_year = call_generator("generate_datetime", &kwargs).unwrap();
        let diff = year.as_str().unwrap().parse::<i32>().unwrap()
            - last_year.as_str().unwrap().parse::<i32>().unwrap();
        assert_eq!(diff, 1);
    }

    #[test]
    fn test_add_months_clamps_day() {
        let base = NaiveDate::from_ymd_opt(2026, 1, 31)
            .unwrap()
            .and_hms_opt(12, 0, 0)
            .unwrap();
        let shifted = add_months(base, 1);
        assert_eq!(shifted.date(), NaiveDate::from_ymd_opt(2026, 2, 28).unwrap());
    }
}
