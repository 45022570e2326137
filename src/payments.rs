//! UPI-оплата: идентификаторы заказов, уникализация суммы, deep-link
//! `upi://pay` и QR-код к нему.

use image::{DynamicImage, ImageFormat, Luma};
use qrcode::QrCode;
use rand::RngCore;
use std::io::Cursor;

/// `ORD-` + 8 случайных байт в hex. Идентификатор попадает в примечание
/// UPI-перевода, по нему админ сверяет поступление.
pub fn generate_order_id() -> String {
    let mut raw = [0u8; 8];
    rand::rng().fill_bytes(&mut raw);
    format!("ORD-{}", hex::encode(raw).to_uppercase())
}

/// Подмешивает в сумму пайсы из id пользователя. Два одновременных платежа
/// на один план почти всегда различимы по копейкам в выписке.
pub fn apply_unique_paise(amount: f64, user_id: i64) -> f64 {
    let paise = (user_id.unsigned_abs() % 100) as f64;
    let whole = amount.trunc();
    whole + paise / 100.0
}

pub fn build_upi_url(upi_id: &str, payee_name: &str, amount: f64, order_id: &str) -> String {
    format!(
        "upi://pay?pa={}&pn={}&am={:.2}&cu=INR&tr={}&tn={}",
        urlencoding::encode(upi_id),
        urlencoding::encode(payee_name),
        amount,
        urlencoding::encode(order_id),
        urlencoding::encode(&format!("Order:{}", order_id)),
    )
}

/// PNG с QR-кодом платёжной ссылки.
pub fn qr_png_bytes(payload: &str) -> Result<Vec<u8>, anyhow::Error> {
    let code = QrCode::new(payload.as_bytes())
        .map_err(|e| anyhow::anyhow!("Не удалось построить QR-код: {}", e))?;

    let image = code
        .render::<Luma<u8>>()
        .quiet_zone(true)
        .min_dimensions(512, 512)
        .build();

    let mut bytes = Vec::new();
    DynamicImage::ImageLuma8(image)
        .write_to(&mut Cursor::new(&mut bytes), ImageFormat::Png)
        .map_err(|e| anyhow::anyhow!("Не удалось закодировать QR в PNG: {}", e))?;
    Ok(bytes)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_ids_are_unique_and_prefixed() {
        let a = generate_order_id();
        let b = generate_order_id();
        assert!(a.starts_with("ORD-"));
        assert_eq!(a.len(), 4 + 16);
        assert_ne!(a, b);
    }

    #[test]
    fn unique_paise_comes_from_user_id() {
        assert_eq!(apply_unique_paise(99.0, 1234567), 99.67);
        assert_eq!(apply_unique_paise(99.5, 1234500), 99.0);
        assert_eq!(apply_unique_paise(50.0, -7), 50.07);
    }

    #[test]
    fn upi_url_encodes_fields() {
        let url = build_upi_url("shop@upi", "File Gate", 99.67, "ORD-AB12");
        assert!(url.starts_with("upi://pay?pa=shop%40upi&pn=File%20Gate&am=99.67&cu=INR"));
        assert!(url.contains("&tr=ORD-AB12"));
        assert!(url.contains("&tn=Order%3AORD-AB12"));
    }

    #[test]
    fn qr_renders_to_png() {
        let bytes = qr_png_bytes("upi://pay?pa=shop@upi&am=99.67").unwrap();
        assert_eq!(&bytes[..8], b"\x89PNG\r\n\x1a\n");
    }
}
