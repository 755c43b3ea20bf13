//! Form checks run before anything is sent to the backend.

use crate::error::{Error, Result};
use crate::models::{BrokerRegistration, LeadInquiry, NewProperty, MAX_IMAGES};

const MIN_PASSWORD_LEN: usize = 6;

fn required(field: &'static str, value: &str) -> Result<()> {
    if value.trim().is_empty() {
        return Err(Error::validation(field, "is required"));
    }
    Ok(())
}

/// Ten-digit mobile number, optionally prefixed with +91
pub fn validate_phone(field: &'static str, phone: &str) -> Result<()> {
    let digits: String = phone.chars().filter(|c| !c.is_whitespace() && *c != '-').collect();
    let digits = digits.strip_prefix("+91").unwrap_or(digits.as_str());
    if digits.len() != 10 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(Error::validation(field, "must be a 10-digit mobile number"));
    }
    Ok(())
}

pub fn validate_email(email: &str) -> Result<()> {
    let email = email.trim();
    let valid = email
        .split_once('@')
        .map_or(false, |(user, domain)| !user.is_empty() && domain.contains('.') && !domain.ends_with('.'));
    if !valid {
        return Err(Error::validation("email", "is not a valid address"));
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<()> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(Error::validation(
            "password",
            format!("must be at least {} characters", MIN_PASSWORD_LEN),
        ));
    }
    Ok(())
}

pub fn validate_registration(form: &BrokerRegistration) -> Result<()> {
    required("name", &form.name)?;
    validate_email(&form.email)?;
    validate_phone("phone", &form.phone)?;
    if let Some(whatsapp) = form.whatsapp.as_deref().filter(|w| !w.trim().is_empty()) {
        validate_phone("whatsapp", whatsapp)?;
    }
    required("rera_number", &form.rera_number)?;
    required("city", &form.city)?;
    if form.service_districts.iter().all(|d| d.trim().is_empty()) {
        return Err(Error::validation("service_districts", "pick at least one district"));
    }
    Ok(())
}

pub fn validate_lead(form: &LeadInquiry) -> Result<()> {
    required("property_id", &form.property_id)?;
    required("name", &form.name)?;
    validate_phone("phone", &form.phone)?;
    if let Some(email) = form.email.as_deref().filter(|e| !e.trim().is_empty()) {
        validate_email(email)?;
    }
    Ok(())
}

pub fn validate_property(form: &NewProperty, image_count: usize) -> Result<()> {
    required("title", &form.title)?;
    required("city", &form.city)?;
    required("district", &form.district)?;
    if form.price <= 0 {
        return Err(Error::validation("price", "must be greater than zero"));
    }
    validate_image_count(image_count)
}

pub fn validate_image_count(count: usize) -> Result<()> {
    if count > MAX_IMAGES {
        return Err(Error::validation(
            "images",
            format!("at most {} images per listing", MAX_IMAGES),
        ));
    }
    Ok(())
}
