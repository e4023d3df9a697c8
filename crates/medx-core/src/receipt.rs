//! # Receipt Templates
//!
//! Builds standalone HTML documents for thermal receipts and queue tickets.
//!
//! ## Template Layouts
//! ```text
//! ┌──────────────────────┐ ┌──────────────────────┐ ┌──────────────────────┐
//! │ check-6 (default)    │ │ check-4-58           │ │ check-1              │
//! │  [logo]              │ │  [logo]              │ │  [logo]              │
//! │  CLINIC / address    │ │  CLINIC / address    │ │ ┌ ─ ─ ─ ─ ─ ─ ─ ─ ┐  │
//! │  Sana / Vaqt rows    │ │  date time           │ │   CLINIC, date       │
//! │  Bemor               │ │ ┌──────────────────┐ │ │   Bemor: name        │
//! │  ticket number       │ │ │  A-021 (boxed)   │ │ │   A-021 (huge)       │
//! │  service table       │ │ └──────────────────┘ │ │   service, price     │
//! │  total / payment     │ │  patient, service    │ │   payment, QR        │
//! │  QR, footer          │ │  JAMI, payment, QR   │ │ └ ─ ─ ─ ─ ─ ─ ─ ─ ┘  │
//! └──────────────────────┘ └──────────────────────┘ └──────────────────────┘
//! ```
//!
//! Every user-supplied string passes through [`escape_html`].

use chrono::{DateTime, FixedOffset};
use serde::{Deserialize, Serialize};
use ts_rs::TS;

use crate::paper::PaperSize;
use crate::types::PrintMode;

/// Footer used when the clinic has not configured one.
pub const DEFAULT_FOOTER: &str = "Спасибо за доверие!";

/// Clinic name used when the settings leave it blank.
pub const DEFAULT_CLINIC_LABEL: &str = "KLINIKA";

const QR_SERVICE_URL: &str = "https://api.qrserver.com/v1/create-qr-code/?size=160x160&margin=0&data=";

// =============================================================================
// Print Settings
// =============================================================================

/// Receipt layout choice.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[ts(export)]
pub enum ReceiptTemplateId {
    #[serde(rename = "check-4-58")]
    Check458,
    #[serde(rename = "check-1")]
    Check1,
    #[default]
    #[serde(rename = "check-6")]
    Check6,
}

/// Full roll width or a width that keeps a margin on both sides.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[serde(rename_all = "lowercase")]
#[ts(export)]
pub enum ReceiptWidthMode {
    #[default]
    Standard,
    Safe,
}

/// User-editable print configuration.
///
/// The backend stores it; the shell keeps the last copy the UI pushed so a
/// print action can read it without a round trip. Unknown or missing
/// fields fall back to the defaults below.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase", default)]
#[ts(export)]
pub struct PrintSettings {
    pub clinic_name: String,
    pub clinic_phone: String,
    pub clinic_address: String,
    pub footer_note: String,
    pub under_qr_text: String,
    /// Base64 data URL.
    pub logo_data_url: String,
    pub auto_print: bool,
    /// Shown to the user; the device name below is what the driver sees.
    pub preferred_printer_name: String,
    pub preferred_printer_device_name: String,
    pub bold_all_text: bool,
    pub show_total_amount: bool,
    pub show_payment_type: bool,
    pub silent_print_mode: PrintMode,
    /// Print API scale factor (10..=200).
    pub silent_scale_percent: f64,
    pub receipt_width_mode: ReceiptWidthMode,
    pub receipt_template_id: ReceiptTemplateId,
    pub paper_size: PaperSize,
    pub qr_url: String,
    /// Pre-rendered QR image; preferred over fetching one by URL.
    pub qr_image_data_url: String,
    /// Zoom applied to the whole receipt body (50..=200).
    pub font_scale_percent: u32,
    /// Scale of the logo slot height (50..=200).
    pub logo_scale_percent: u32,
}

impl Default for PrintSettings {
    fn default() -> Self {
        PrintSettings {
            clinic_name: "MedX Clinic".to_string(),
            clinic_phone: String::new(),
            clinic_address: String::new(),
            footer_note: String::new(),
            under_qr_text: String::new(),
            logo_data_url: String::new(),
            auto_print: false,
            preferred_printer_name: String::new(),
            preferred_printer_device_name: String::new(),
            bold_all_text: true,
            show_total_amount: true,
            show_payment_type: true,
            silent_print_mode: PrintMode::Image,
            silent_scale_percent: 100.0,
            receipt_width_mode: ReceiptWidthMode::Standard,
            receipt_template_id: ReceiptTemplateId::Check6,
            paper_size: PaperSize::Mm80,
            qr_url: String::new(),
            qr_image_data_url: String::new(),
            font_scale_percent: 100,
            logo_scale_percent: 100,
        }
    }
}

impl PrintSettings {
    /// Width of the printable area in millimetres.
    pub fn content_width_mm(&self) -> u32 {
        match self.receipt_width_mode {
            ReceiptWidthMode::Standard => self.paper_size.width_mm(),
            ReceiptWidthMode::Safe => self.paper_size.safe_width_mm(),
        }
    }

    fn font_scale(&self) -> u32 {
        self.font_scale_percent.clamp(50, 200)
    }

    fn logo_scale(&self) -> u32 {
        self.logo_scale_percent.clamp(50, 200)
    }
}

// =============================================================================
// Payloads
// =============================================================================

/// Split of a mixed payment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, TS)]
#[serde(default)]
#[ts(export)]
pub struct PaymentBreakdown {
    #[ts(type = "number | null")]
    pub cash: Option<i64>,
    #[ts(type = "number | null")]
    pub card: Option<i64>,
    #[ts(type = "number | null")]
    pub transfer: Option<i64>,
}

/// Data printed on a cashier receipt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct ReceiptPayload {
    /// e.g. `AA-000156` or a transaction id.
    pub receipt_no: String,
    /// Queue ticket, e.g. `A-021`.
    pub ticket: String,
    #[serde(rename = "createdAtIso")]
    #[ts(as = "String")]
    pub created_at: DateTime<FixedOffset>,
    pub patient_name: String,
    pub service_name: String,
    #[ts(type = "number")]
    pub amount: i64,
    pub currency: String,
    /// `CASH`, `CARD`, `TRANSFER` or `MIXED`.
    pub payment_method: String,
    #[serde(default)]
    pub payment_breakdown: Option<PaymentBreakdown>,
}

/// Data printed on a reception queue ticket.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, TS)]
#[serde(rename_all = "camelCase")]
#[ts(export)]
pub struct QueueTicket {
    pub ticket_number: String,
    pub patient_name: String,
    #[serde(default)]
    pub doctor_name: Option<String>,
    #[serde(default)]
    #[ts(as = "Option<String>")]
    pub created_at: Option<DateTime<FixedOffset>>,
}

// =============================================================================
// Formatting Helpers
// =============================================================================

/// Escapes text for inclusion in HTML content or attribute values.
pub fn escape_html(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for c in input.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#039;"),
            _ => out.push(c),
        }
    }
    out
}

/// Formats an amount with Russian digit grouping (non-breaking spaces).
pub fn format_money(amount: i64) -> String {
    let digits = amount.unsigned_abs().to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3 * 2);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push('\u{a0}');
        }
        grouped.push(ch);
    }
    if amount < 0 {
        format!("-{}", grouped)
    } else {
        grouped
    }
}

/// Human label for a payment method (Uzbek, as printed at the desk).
///
/// Mixed payments list their parts when amounts are shown.
pub fn payment_label(
    method: &str,
    breakdown: Option<&PaymentBreakdown>,
    currency: &str,
    include_amounts: bool,
) -> String {
    let method = method.trim().to_ascii_uppercase();
    let label = match method.as_str() {
        "CASH" => "Naqd",
        "CARD" => "Karta",
        "TRANSFER" => "O‘tkazma",
        "MIXED" => "Aralash",
        _ => return method,
    };

    if method != "MIXED" || !include_amounts {
        return label.to_string();
    }

    let currency = currency.trim();
    let with_currency = |amount: i64| {
        if currency.is_empty() {
            format_money(amount)
        } else {
            format!("{} {}", format_money(amount), currency)
        }
    };

    let parts: Vec<String> = breakdown
        .map(|b| {
            [("Naqd", b.cash), ("Karta", b.card), ("O‘tkazma", b.transfer)]
                .into_iter()
                .filter_map(|(name, amount)| {
                    amount
                        .filter(|a| *a != 0)
                        .map(|a| format!("{}: {}", name, with_currency(a)))
                })
                .collect()
        })
        .unwrap_or_default();

    if parts.is_empty() {
        label.to_string()
    } else {
        parts.join(" / ")
    }
}

// =============================================================================
// Shared Blocks
// =============================================================================

struct Blocks {
    head: String,
    header: String,
    logo: String,
    footer: String,
    qr: String,
    under_qr: String,
}

fn common_blocks(s: &PrintSettings) -> Blocks {
    let width = s.paper_size.width_mm();
    let content = s.content_width_mm();
    let narrow = s.paper_size == PaperSize::Mm58;
    let logo_scale = s.logo_scale();

    let padding = if narrow { "4mm 2mm 6mm" } else { "4mm 3mm 6mm" };
    let slot_height = if narrow { 22 } else { 18 } * logo_scale / 100;
    let logo_height = if narrow { 20 } else { 16 } * logo_scale / 100;
    let queue_size = if narrow { 42 } else { 44 };
    let qr_size = if narrow { 120 } else { 140 };
    let bold = if s.bold_all_text { "font-weight: 900;" } else { "" };

    let head = format!(
        r#"
    <meta charset="UTF-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1.0" />
    <title>Chek</title>
    <style>
      * {{ box-sizing: border-box; }}
      body {{ margin: 0; padding: 0; background: #fff; color: #000; {bold} }}
      @page {{ size: {width}mm auto; margin: 0; }}
      html, body {{ width: {width}mm; }}
      @media print {{ body {{ margin: 0; padding: 0; }} }}
      .receipt {{ width: {content}mm; max-width: {content}mm; margin: 0 auto; padding: {padding}; font-family: "Courier New", monospace; zoom: {zoom}%; }}
      .center {{ text-align: center; }}
      .row {{ display:flex; justify-content:space-between; gap: 8px; font-size: 12px; }}
      .row > span {{ min-width: 0; }}
      .divider {{ border-top: 1px dashed #000; margin: 6px 0; }}
      .logo {{ font-weight: 900; font-size: 16px; text-transform: uppercase; }}
      .sub {{ font-size: 11px; line-height: 1.2; }}
      .logo-slot {{ display:flex; align-items:center; justify-content:center; margin: 2px 0 6px; min-height: {slot_height}mm; }}
      .logo-img {{ max-width: 100%; max-height: {logo_height}mm; object-fit: contain; }}
      .queue {{ text-align:center; margin: 8px 0; }}
      .queue-label {{ font-size: 11px; text-transform: uppercase; }}
      .queue-num {{ font-size: {queue_size}px; font-weight: 900; letter-spacing: 2px; line-height: 1; }}
      .title {{ font-weight: 800; margin-top: 4px; font-size: 12px; }}
      .value {{ font-weight: 900; font-size: 13px; word-break: break-word; }}
      .total {{ display:flex; justify-content:space-between; font-weight: 900; font-size: 14px; }}
      .small {{ font-size: 11px; }}
      .qr {{ display:block; margin: 10px auto 4px; width: {qr_size}px; height: {qr_size}px; }}
      .underqr {{ margin-top: 6px; font-size: 11px; text-align: center; }}
    </style>
  "#,
        zoom = s.font_scale(),
    );

    let clinic = if s.clinic_name.trim().is_empty() {
        DEFAULT_CLINIC_LABEL
    } else {
        s.clinic_name.as_str()
    };
    let address = if s.clinic_address.is_empty() {
        String::new()
    } else {
        format!("{}<br>", escape_html(&s.clinic_address))
    };
    let phone = if s.clinic_phone.is_empty() {
        String::new()
    } else {
        format!("tel: {}", escape_html(&s.clinic_phone))
    };
    let header = format!(
        r#"
    <div class="center">
      <div class="logo">{}</div>
      <div class="sub">
        {}
        {}
      </div>
    </div>
  "#,
        escape_html(clinic),
        address,
        phone
    );

    let logo_url = s.logo_data_url.trim();
    let logo = format!(
        r#"
    <div class="logo-slot">
      {}
    </div>
  "#,
        if logo_url.is_empty() {
            String::new()
        } else {
            format!(
                r#"<img class="logo-img" src="{}" alt="logo" />"#,
                escape_html(logo_url)
            )
        }
    );

    let footer = format!(
        r#"
    <div class="divider"></div>
    <div class="center small">
      {}
    </div>
  "#,
        if s.footer_note.is_empty() {
            DEFAULT_FOOTER.to_string()
        } else {
            escape_html(&s.footer_note)
        }
    );

    let qr_image = s.qr_image_data_url.trim();
    let qr = if !qr_image.is_empty() {
        format!(r#"<img class="qr" src="{}" alt="QR">"#, escape_html(qr_image))
    } else if !s.qr_url.is_empty() {
        format!(
            r#"<img class="qr" src="{}{}" alt="QR">"#,
            QR_SERVICE_URL,
            urlencoding::encode(&s.qr_url)
        )
    } else {
        String::new()
    };

    let under_qr_text = s.under_qr_text.trim();
    let under_qr = if under_qr_text.is_empty() {
        String::new()
    } else {
        format!(r#"<div class="underqr">{}</div>"#, escape_html(under_qr_text))
    };

    Blocks {
        head,
        header,
        logo,
        footer,
        qr,
        under_qr,
    }
}

// =============================================================================
// Receipt
// =============================================================================

/// Builds the receipt document for the configured template.
pub fn build_receipt_html(p: &ReceiptPayload, s: &PrintSettings) -> String {
    let b = common_blocks(s);
    let date = escape_html(&p.created_at.format("%d.%m.%Y").to_string());
    let time = escape_html(&p.created_at.format("%H:%M").to_string());
    let money = escape_html(&format_money(p.amount));
    let currency = escape_html(&p.currency);
    let patient = escape_html(&p.patient_name);
    let service = escape_html(&p.service_name);
    let ticket = escape_html(&p.ticket);
    let pay_label = escape_html(&payment_label(
        &p.payment_method,
        p.payment_breakdown.as_ref(),
        &p.currency,
        s.show_total_amount,
    ));

    match s.receipt_template_id {
        ReceiptTemplateId::Check458 => {
            let total = if s.show_total_amount {
                format!(
                    r#"
      <div class="service-row">
        <div class="service-name">JAMI:</div>
        <div class="price">{money} {currency}</div>
      </div>
    "#
                )
            } else {
                String::new()
            };
            let payment = if s.show_payment_type {
                format!(
                    r#"<div class="row small" style="margin-top: 4px;"><span>To'lov turi:</span><span>{pay_label}</span></div>"#
                )
            } else {
                String::new()
            };
            format!(
                r#"
<!DOCTYPE html>
<html lang="ru">
<head>
{head}
  <style>
    .queue-box {{ border: 2px solid #000; border-radius: 8px; padding: 6px 6px; }}
    .service-row {{ display:flex; justify-content:space-between; align-items:flex-end; margin-top: 8px; }}
    .service-name {{ font-weight: 900; font-size: 12px; }}
    .price {{ font-weight: 900; font-size: 16px; }}
  </style>
</head>
<body>
  <div class="receipt">
    {logo}
    {header}
    <div class="divider"></div>
    <div class="row"><span>{date} {time}</span><span></span></div>
    <div class="divider"></div>

    <div class="queue queue-box">
      <div class="queue-label">NAVBAT RAQAMINGIZ</div>
      <div class="queue-num">{ticket}</div>
    </div>

    <div class="title">Bemor (Mijoz):</div>
    <div class="value">{patient}</div>

    <div class="divider"></div>

    <div class="title">Xizmat turi:</div>
    <div class="value">{service}</div>

    <div class="divider"></div>

    {total}

    {payment}

    {qr}
    {under_qr}
    {footer}
  </div>
</body>
</html>"#,
                head = b.head,
                logo = b.logo,
                header = b.header,
                qr = b.qr,
                under_qr = b.under_qr,
                footer = b.footer,
            )
        }

        ReceiptTemplateId::Check1 => {
            let price = if s.show_total_amount {
                format!(r#"<div class="price">{money} {currency}</div>"#)
            } else {
                String::new()
            };
            let payment = if s.show_payment_type {
                format!(r#"<div class="small">To'lov turi: {pay_label}</div>"#)
            } else {
                String::new()
            };
            format!(
                r#"
<!DOCTYPE html>
<html lang="ru">
<head>
{head}
  <style>
    .wrap {{ border: 2px dashed #000; padding: 8mm 4mm; text-align: center; font-size: 14px; }}
    .queue-num {{ font-size: 48px; letter-spacing: 3px; }}
    .service {{ font-size: 16px; font-weight: 900; margin-top: 10px; }}
    .price {{ font-size: 22px; font-weight: 900; }}
  </style>
</head>
<body>
  <div class="receipt">
    {logo}
    <div class="wrap">
      {header}
      <div class="divider"></div>
      <div class="center"><strong>{date} {time}</strong></div>
      <div class="divider"></div>
      <div style="text-align:left">
        Bemor: <strong>{patient}</strong><br><br>
        Sizning navbat raqamingiz:
      </div>
      <div class="queue-num">{ticket}</div>
      <div class="divider"></div>
      <div class="service">{service}</div>
      {price}
      <div class="divider"></div>
      {payment}
      {qr}
      {under_qr}
      {footer}
    </div>
  </div>
</body>
</html>"#,
                head = b.head,
                logo = b.logo,
                header = b.header,
                qr = b.qr,
                under_qr = b.under_qr,
                footer = b.footer,
            )
        }

        ReceiptTemplateId::Check6 => {
            let price_cell = if s.show_total_amount { money.as_str() } else { "" };
            let total = if s.show_total_amount {
                format!(
                    r#"<div class="total"><span>Jami to'lov:</span><span>{money} {currency}</span></div>"#
                )
            } else {
                String::new()
            };
            let payment = if s.show_payment_type {
                format!(
                    r#"<div class="row small" style="margin-top: 2px;"><span>To'lov turi:</span><span>{pay_label}</span></div>"#
                )
            } else {
                String::new()
            };
            format!(
                r#"
<!DOCTYPE html>
<html lang="ru">
<head>
{head}
  <style>
    .table-header, .table-row {{ display:flex; justify-content:space-between; font-size: 12px; }}
    .table-header span {{ font-weight: 900; border-bottom: 1px dashed #000; padding-bottom: 2px; }}
    .col-service {{ width: 60%; text-align: left; }}
    .col-qty {{ width: 10%; text-align: center; }}
    .col-price {{ width: 30%; text-align: right; }}
  </style>
</head>
<body>
  <div class="receipt">
    {logo}
    {header}
    <div class="divider"></div>
    <div class="row"><span>Sana:</span><span>{date}</span></div>
    <div class="row"><span>Vaqt:</span><span>{time}</span></div>
    <div class="divider"></div>

    <div class="title">Bemor:</div>
    <div class="value">{patient}</div>
    <div class="divider"></div>

    <div class="queue">
      <div class="queue-label">Sizning navbat raqamingiz</div>
      <div class="queue-num">{ticket}</div>
    </div>
    <div class="divider"></div>

    <div class="title">Ko'rsatiladigan xizmatlar:</div>
    <div class="table-header">
      <span class="col-service">Xizmat</span>
      <span class="col-qty">Soni</span>
      <span class="col-price">Narxi</span>
    </div>
    <div class="table-row">
      <span class="col-service">{service}</span>
      <span class="col-qty">1</span>
      <span class="col-price">{price_cell}</span>
    </div>

    <div class="divider"></div>
    {total}
    {payment}

    {qr}
    {under_qr}
    {footer}
  </div>
</body>
</html>"#,
                head = b.head,
                logo = b.logo,
                header = b.header,
                qr = b.qr,
                under_qr = b.under_qr,
                footer = b.footer,
            )
        }
    }
}

// =============================================================================
// Queue Ticket
// =============================================================================

/// Builds the reception queue ticket document.
pub fn build_queue_ticket_html(t: &QueueTicket, s: &PrintSettings) -> String {
    let width = s.paper_size.width_mm();
    let content = s.content_width_mm();
    let ticket = escape_html(&t.ticket_number);

    let optional_meta = |value: Option<String>| {
        value
            .filter(|v| !v.is_empty())
            .map(|v| format!(r#"<div class="meta">{}</div>"#, escape_html(&v)))
            .unwrap_or_default()
    };

    let phone = optional_meta(Some(s.clinic_phone.clone()));
    let address = optional_meta(Some(s.clinic_address.clone()));
    let doctor = optional_meta(t.doctor_name.clone());
    let created = optional_meta(
        t.created_at
            .map(|c| c.format("%d.%m.%Y, %H:%M:%S").to_string()),
    );
    let footer = if s.footer_note.is_empty() {
        String::new()
    } else {
        format!(r#"<div class="footer">{}</div>"#, escape_html(&s.footer_note))
    };

    format!(
        r#"
<!doctype html>
<html>
  <head>
    <meta charset="utf-8" />
    <meta name="viewport" content="width=device-width, initial-scale=1" />
    <title>Ticket {ticket}</title>
    <style>
      :root {{ color-scheme: light; }}
      @page {{ size: {width}mm auto; margin: 0; }}
      html, body {{ width: {width}mm; }}
      body {{ font-family: Arial, sans-serif; margin: 0; padding: 0; background: #fff; color: #000; }}
      .receipt {{ width: {content}mm; max-width: {content}mm; margin: 0 auto; padding: 4mm 2mm 6mm; zoom: {zoom}%; }}
      .h {{ text-align: center; margin-bottom: 12px; }}
      .name {{ font-weight: 700; font-size: 16px; margin-top: 6px; }}
      .ticket {{ font-weight: 900; font-size: 44px; letter-spacing: 1px; margin: 10px 0; }}
      .meta {{ font-size: 12px; color: #334155; margin-top: 6px; }}
      .line {{ border-top: 1px dashed #cbd5e1; margin: 12px 0; }}
      .footer {{ margin-top: 12px; font-size: 12px; color: #475569; text-align: center; }}
      @media print {{
        body {{ padding: 0; }}
      }}
    </style>
  </head>
  <body>
    <div class="receipt">
      <div class="h">
      <div style="font-weight:700">{clinic}</div>
      {phone}
      {address}
      <div class="line"></div>
      <div class="ticket">{ticket}</div>
      <div class="name">{patient}</div>
      {doctor}
      {created}
      <div class="line"></div>
      {footer}
      </div>
    </div>
  </body>
</html>"#,
        zoom = s.font_scale(),
        clinic = escape_html(&s.clinic_name),
        patient = escape_html(&t.patient_name),
    )
}

// =============================================================================
// Unit Tests
// =============================================================================
