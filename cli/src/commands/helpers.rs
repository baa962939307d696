use anyhow::{Context, Result};
use chrono::{Local, NaiveDate};
use serde::Serialize;
use tabled::{
    Table, Tabled,
    settings::{Alignment, Modify, Style, object::Columns},
};

use frostbox_core::models::{
    CategoryWithCount, DATE_FORMAT, LocationWithCount, NEVER_EXPIRES, Product,
};

pub(crate) fn today() -> NaiveDate {
    Local::now().date_naive()
}

pub(crate) fn parse_date(date_str: &str) -> Result<NaiveDate> {
    match date_str {
        "today" => Ok(today()),
        "yesterday" => Ok(today() - chrono::Duration::days(1)),
        "tomorrow" => Ok(today() + chrono::Duration::days(1)),
        s => NaiveDate::parse_from_str(s, DATE_FORMAT).with_context(|| {
            format!("Invalid date '{s}'. Use YYYY-MM-DD or today/yesterday/tomorrow")
        }),
    }
}

pub(crate) fn parse_optional_date(date_str: Option<&str>) -> Result<Option<NaiveDate>> {
    date_str.map(parse_date).transpose()
}

pub(crate) fn print_json<T: Serialize + ?Sized>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

pub(crate) fn json_error(message: &str) -> String {
    #[derive(Serialize)]
    struct CliError<'a> {
        error: &'a str,
    }
    serde_json::to_string(&CliError { error: message })
        .unwrap_or_else(|_| format!("{{\"error\":\"{message}\"}}"))
}

pub(crate) fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let end = s.char_indices().nth(max - 3).map_or(s.len(), |(i, _)| i);
        format!("{}...", &s[..end])
    }
}

pub(crate) fn format_quantity(quantity: f64, unit: &str) -> String {
    if quantity.fract() == 0.0 {
        format!("{quantity:.0} {unit}")
    } else {
        format!("{quantity} {unit}")
    }
}

/// Human wording for the time left before a product expires.
pub(crate) fn describe_days_left(days: i64) -> String {
    match days {
        NEVER_EXPIRES => "-".to_string(),
        d if d < 0 => format!("expired {} d ago", -d),
        0 => "today".to_string(),
        1 => "1 day".to_string(),
        d => format!("{d} days"),
    }
}

pub(crate) fn print_category_table(categories: &[CategoryWithCount]) {
    #[derive(Tabled)]
    struct CategoryRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Color")]
        color: String,
        #[tabled(rename = "Storage days")]
        days: i64,
        #[tabled(rename = "Products")]
        products: i64,
        #[tabled(rename = "Description")]
        description: String,
    }

    let rows: Vec<CategoryRow> = categories
        .iter()
        .map(|c| CategoryRow {
            id: c.category.id,
            name: truncate(&c.category.name, 30),
            color: c.category.color.clone(),
            days: c.category.default_storage_days,
            products: c.product_count,
            description: c
                .category
                .description
                .as_deref()
                .map(|d| truncate(d, 40))
                .unwrap_or_default(),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(3..5)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

pub(crate) fn print_location_table(locations: &[LocationWithCount]) {
    #[derive(Tabled)]
    struct LocationRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Section")]
        section: String,
        #[tabled(rename = "Order")]
        sort_order: i64,
        #[tabled(rename = "Products")]
        products: i64,
    }

    let rows: Vec<LocationRow> = locations
        .iter()
        .map(|l| LocationRow {
            id: l.location.id,
            name: truncate(&l.location.name, 30),
            section: l.location.freezer_section.clone().unwrap_or_default(),
            sort_order: l.location.sort_order,
            products: l.product_count,
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(3..5)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}

pub(crate) fn print_product_table(products: &[Product], today: NaiveDate) {
    #[derive(Tabled)]
    struct ProductRow {
        #[tabled(rename = "ID")]
        id: i64,
        #[tabled(rename = "Name")]
        name: String,
        #[tabled(rename = "Quantity")]
        quantity: String,
        #[tabled(rename = "Category")]
        category: String,
        #[tabled(rename = "Location")]
        location: String,
        #[tabled(rename = "Frozen")]
        frozen: String,
        #[tabled(rename = "Expires")]
        expires: String,
        #[tabled(rename = "Left")]
        left: String,
    }

    let rows: Vec<ProductRow> = products
        .iter()
        .map(|p| ProductRow {
            id: p.id,
            name: truncate(&p.name, 30),
            quantity: format_quantity(p.quantity, &p.unit),
            category: p.category_name.clone().unwrap_or_default(),
            location: p.location_name.clone().unwrap_or_default(),
            frozen: p.frozen_date.format(DATE_FORMAT).to_string(),
            expires: p
                .expiration_date
                .map(|d| d.format(DATE_FORMAT).to_string())
                .unwrap_or_else(|| "never".to_string()),
            left: describe_days_left(p.days_until_expiration(today)),
        })
        .collect();

    let table = Table::new(&rows)
        .with(Style::rounded())
        .with(Modify::new(Columns::new(2..3)).with(Alignment::right()))
        .to_string();
    println!("{table}");
}
