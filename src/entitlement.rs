//! Решение о праве на выдачу файла.
//!
//! Флаги `is_verified` / `is_premium` в БД могут отставать от реальности до
//! следующего sweep-а, поэтому решение принимается по срокам, а не по
//! флагам. Премиум проверяется первым.

use crate::db::UserRecord;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Entitlements {
    pub premium_active: bool,
    pub verification_active: bool,
}

impl Entitlements {
    pub fn may_deliver(&self) -> bool {
        self.premium_active || self.verification_active
    }
}

pub fn evaluate(user: Option<&UserRecord>, now: i64) -> Entitlements {
    let Some(user) = user else {
        return Entitlements {
            premium_active: false,
            verification_active: false,
        };
    };

    let premium_active = user
        .premium_expiry
        .map(|expiry| expiry > now)
        .unwrap_or(false);
    let verification_active = user
        .verified_until
        .map(|until| until > now)
        .unwrap_or(false);

    Entitlements {
        premium_active,
        verification_active,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn user(verified_until: Option<i64>, premium_expiry: Option<i64>) -> UserRecord {
        UserRecord {
            user_id: 1,
            username: None,
            first_name: None,
            joined_at: 0,
            is_verified: verified_until.is_some(),
            verified_until,
            is_premium: premium_expiry.is_some(),
            premium_expiry,
            premium_plan: None,
        }
    }

    #[test]
    fn unknown_user_has_nothing() {
        let e = evaluate(None, 1000);
        assert!(!e.may_deliver());
    }

    #[test]
    fn active_premium_is_enough() {
        let u = user(None, Some(2000));
        assert!(evaluate(Some(&u), 1000).may_deliver());
    }

    #[test]
    fn expired_premium_with_active_verification_still_delivers() {
        let u = user(Some(2000), Some(500));
        let e = evaluate(Some(&u), 1000);
        assert!(!e.premium_active);
        assert!(e.verification_active);
        assert!(e.may_deliver());
    }

    #[test]
    fn both_expired_denies_even_with_stale_flags() {
        // Флаги в записи ещё не сняты sweep-ом, но сроки вышли.
        let mut u = user(Some(500), Some(800));
        u.is_verified = true;
        u.is_premium = true;
        assert!(!evaluate(Some(&u), 1000).may_deliver());
    }

    #[test]
    fn expiry_boundary_is_exclusive() {
        let u = user(Some(1000), None);
        assert!(!evaluate(Some(&u), 1000).may_deliver());
        assert!(evaluate(Some(&u), 999).may_deliver());
    }
}
