//! Scripted assistant behind the "bot" chat partner.

/// Ordered keyword rules; the first rule with a matching keyword wins
const RULES: &[(&[&str], &str)] = &[
    (
        &["price", "cost", "rate", "budget"],
        "Prices are shown on every listing. Open a property to see the full details and send an inquiry to its broker.",
    ),
    (
        &["register", "sign up", "signup", "join"],
        "Brokers can register from the Join as Broker page. New accounts get a 45-day free trial once an admin approves them.",
    ),
    (
        &["refer", "referral", "code"],
        "Share your referral code with other brokers. Every broker who registers with it adds 30 days to your subscription.",
    ),
    (
        &["subscription", "expire", "renew", "plan"],
        "Your subscription expiry is shown on your dashboard. Referrals extend it automatically.",
    ),
    (
        &["add property", "listing", "upload", "photo"],
        "Choose Add Property on your dashboard. Each listing can carry up to 3 photos and stays live for 45 days.",
    ),
    (
        &["lead", "inquiry", "enquiry"],
        "Inquiries from buyers appear under Leads on your dashboard. Mark them read once you have called back.",
    ),
    (
        &["contact", "support", "help"],
        "You can reach our support team using the contact details in the footer.",
    ),
    (
        &["hello", "hey", "namaste"],
        "Hello! How can I help you today?",
    ),
];

const DEFAULT_REPLY: &str = "Thanks for your message! Our team will get back to you shortly.";

/// Canned response for `text`, matched case-insensitively by substring
pub fn reply_for(text: &str) -> &'static str {
    let text = text.to_lowercase();
    RULES
        .iter()
        .find(|(keywords, _)| keywords.iter().any(|k| text.contains(k)))
        .map(|(_, reply)| *reply)
        .unwrap_or(DEFAULT_REPLY)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn matches_keywords_case_insensitively() {
        assert_eq!(reply_for("What is the PRICE?"), RULES[0].1);
        assert_eq!(reply_for("how do I Register"), RULES[1].1);
    }

    #[test]
    fn first_matching_rule_wins() {
        // "price" and "referral" both match; price comes first
        assert_eq!(reply_for("referral price"), RULES[0].1);
    }

    #[test]
    fn falls_back_to_default() {
        assert_eq!(reply_for("ok"), DEFAULT_REPLY);
        assert_eq!(reply_for(""), DEFAULT_REPLY);
    }

    #[test]
    fn deterministic() {
        assert_eq!(reply_for("hello there"), reply_for("hello there"));
    }
}
