use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use reqwest::{Client, Url};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;

use crate::domain::{CenterDigest, EmailContent, SubscriberEmail, ZoneEmail, format_danger};

const ZONE_TEMPLATE: &str = "zone_forecast.html";
const CENTER_TEMPLATE: &str = "center_forecast.html";

static TEMPLATES: Lazy<tera::Tera> = Lazy::new(|| {
    let mut tera = tera::Tera::default();
    tera.add_raw_templates(vec![
        (ZONE_TEMPLATE, include_str!("../templates/zone_forecast.html")),
        (
            CENTER_TEMPLATE,
            include_str!("../templates/center_forecast.html"),
        ),
    ])
    .expect("Failed to initialize Tera templates");
    tera
});

#[derive(thiserror::Error, Debug)]
pub enum DeliveryError {
    #[error("email API request failed")]
    Http(#[from] reqwest::Error),
    #[error("failed rendering email template")]
    Template(#[from] tera::Error),
    #[error("center digest has no zones")]
    EmptyDigest,
}

/// Outbound email transport for forecast notifications.
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send_zone(
        &self,
        recipient: &SubscriberEmail,
        content: &ZoneEmail,
    ) -> Result<(), DeliveryError>;

    async fn send_center_digest(
        &self,
        recipient: &SubscriberEmail,
        content: &CenterDigest,
    ) -> Result<(), DeliveryError>;
}

/// Sends whichever variant `content` holds.
pub async fn deliver(
    sender: &dyn EmailSender,
    recipient: &SubscriberEmail,
    content: &EmailContent,
) -> Result<(), DeliveryError> {
    match content {
        EmailContent::Zone(zone) => sender.send_zone(recipient, zone).await,
        EmailContent::CenterDigest(digest) => sender.send_center_digest(recipient, digest).await,
    }
}

#[derive(Clone)]
pub struct EmailClient {
    http_client: Client,
    base_url: Url,
    sender: SubscriberEmail,
    auth_token: SecretString,
}

#[derive(Serialize)]
struct EmailUnit<'a> {
    email: &'a str,
}

impl<'a> EmailUnit<'a> {
    fn new(email: &'a str) -> Self {
        Self { email }
    }
}

#[derive(Serialize)]
struct SendEmailRequest<'a> {
    from: EmailUnit<'a>,
    to: Vec<EmailUnit<'a>>,
    subject: &'a str,
    html: &'a str,
    text: &'a str,
}

impl EmailClient {
    pub fn new(
        base_url: Url,
        sender: SubscriberEmail,
        auth_token: SecretString,
        timeout: Duration,
    ) -> Result<Self, reqwest::Error> {
        Ok(Self {
            http_client: Client::builder().timeout(timeout).build()?,
            base_url,
            sender,
            auth_token,
        })
    }

    #[tracing::instrument(name = "Sending email", skip(self, html_content, text_content))]
    pub async fn send_email(
        &self,
        recipient: &SubscriberEmail,
        subject: &str,
        html_content: &str,
        text_content: &str,
    ) -> Result<(), reqwest::Error> {
        let mut url = self.base_url.clone();
        if let Ok(mut segments) = url.path_segments_mut() {
            segments.pop_if_empty().extend(["v1", "email"]);
        }

        let body = SendEmailRequest {
            from: EmailUnit::new(self.sender.as_ref()),
            to: vec![EmailUnit::new(recipient.as_ref())],
            html: html_content,
            text: text_content,
            subject,
        };

        self.http_client
            .post(url)
            .header(
                "Authorization",
                "Bearer ".to_owned() + self.auth_token.expose_secret(),
            )
            .json(&body)
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }
}

#[async_trait]
impl EmailSender for EmailClient {
    #[tracing::instrument(
        name = "Sending zone forecast email",
        skip(self, content),
        fields(zone_id = %content.zone_id)
    )]
    async fn send_zone(
        &self,
        recipient: &SubscriberEmail,
        content: &ZoneEmail,
    ) -> Result<(), DeliveryError> {
        let subject = format!("New Avalanche Forecast for {}", content.label());
        let html = render_zone_html(content)?;
        let text = render_zone_text(content);
        self.send_email(recipient, &subject, &html, &text).await?;
        tracing::info!("Sent forecast email");
        Ok(())
    }

    #[tracing::instrument(
        name = "Sending center digest email",
        skip(self, content),
        fields(center = %content.center_name, zones = content.zones.len())
    )]
    async fn send_center_digest(
        &self,
        recipient: &SubscriberEmail,
        content: &CenterDigest,
    ) -> Result<(), DeliveryError> {
        if content.zones.is_empty() {
            return Err(DeliveryError::EmptyDigest);
        }
        let subject = format!("{} Avalanche Center Forecast Summary", content.center_name);
        let html = render_center_html(content)?;
        let text = render_center_text(content);
        self.send_email(recipient, &subject, &html, &text).await?;
        tracing::info!("Sent center digest email");
        Ok(())
    }
}

fn issued_at_display(content: &ZoneEmail) -> String {
    content.issued_at.format("%a %b %-d %H:%M %Y UTC").to_string()
}

pub fn render_zone_html(content: &ZoneEmail) -> Result<String, tera::Error> {
    let mut ctx = tera::Context::new();
    ctx.insert("zone_id", &content.zone_id);
    ctx.insert("zone_name", content.zone_name.trim());
    ctx.insert("issued_at", &issued_at_display(content));
    ctx.insert("today", &format_danger(&content.today));
    ctx.insert("tomorrow", &format_danger(&content.tomorrow));
    ctx.insert("center_link", &content.center_link);
    TEMPLATES.render(ZONE_TEMPLATE, &ctx)
}

pub fn render_zone_text(content: &ZoneEmail) -> String {
    format!(
        "A new avalanche forecast is available for {label} ({zone_id}).\n\
        Issued: {issued}\n\
        Today: {today}\n\
        Tomorrow: {tomorrow}\n\n\
        Check the latest details: {link}\n",
        label = content.label(),
        zone_id = content.zone_id,
        issued = issued_at_display(content),
        today = format_danger(&content.today),
        tomorrow = format_danger(&content.tomorrow),
        link = content.center_link,
    )
}

pub fn render_center_html(content: &CenterDigest) -> Result<String, tera::Error> {
    let mut ctx = tera::Context::new();
    ctx.insert("center_name", &content.center_name);
    ctx.insert("center_link", &content.center_link);
    ctx.insert("zone_count", &content.zones.len());
    ctx.insert("zones", &content.zones);
    TEMPLATES.render(CENTER_TEMPLATE, &ctx)
}

pub fn render_center_text(content: &CenterDigest) -> String {
    let mut text = format!(
        "Your avalanche center forecast summary for {} is available.\n\n",
        content.center_name
    );
    for zone in &content.zones {
        text.push_str(&format!(
            "- {} ({}): Today: {} | Tomorrow: {}\n",
            zone.zone_name, zone.zone_id, zone.today, zone.tomorrow
        ));
    }
    text.push_str(&format!("\nFor details visit {}\n", content.center_link));
    text
}
