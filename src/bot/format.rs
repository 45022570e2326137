use crate::db::{FileRecord, OrderRecord, PlanRecord, Stats};
use chrono::{DateTime, Local, Utc};

pub fn format_timestamp(ts: i64) -> String {
    DateTime::<Utc>::from_timestamp(ts, 0)
        .map(|dt| {
            dt.with_timezone(&Local)
                .format("%Y-%m-%d %H:%M:%S %:z")
                .to_string()
        })
        .unwrap_or_else(|| format!("Некорректный timestamp: {}", ts))
}

pub fn format_date(ts: i64) -> String {
    DateTime::<Utc>::from_timestamp(ts, 0)
        .map(|dt| dt.with_timezone(&Local).format("%d.%m.%Y %H:%M").to_string())
        .unwrap_or_else(|| "—".to_string())
}

pub fn render_plan_line(plan: &PlanRecord) -> String {
    format!(
        "• {} | {} | {} дн. | ₹{:.2}",
        plan.plan_id, plan.name, plan.days, plan.price
    )
}

pub fn render_order_line(order: &OrderRecord) -> String {
    format!(
        "• {} | user {} | план {} | ₹{:.2} | {} | создан {}",
        order.order_id,
        order.user_id,
        order.plan_id,
        order.amount,
        order.status.as_str(),
        format_date(order.created_at)
    )
}

pub fn render_file_line(file: &FileRecord) -> String {
    let title = if file.description.trim().is_empty() {
        "без описания"
    } else {
        file.description.trim()
    };
    format!("• #{} | {} | добавлен {}", file.post_no, title, format_date(file.created_at))
}

pub fn render_stats(stats: &Stats) -> String {
    format!(
        "📊 Статистика:\n\
         Пользователей: {}\n\
         С активной верификацией: {}\n\
         С активным премиумом: {}\n\
         Файлов: {}\n\
         Заказы pending: {}\n\
         Заказы paid: {}\n\
         Попыток обхода: {}",
        stats.users,
        stats.verified_now,
        stats.premium_now,
        stats.files,
        stats.orders_pending,
        stats.orders_paid,
        stats.bypass_attempts
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::OrderStatus;

    #[test]
    fn order_line_contains_status_and_amount() {
        let order = OrderRecord {
            order_id: "ORD-AB".to_string(),
            user_id: 7,
            plan_id: "m1".to_string(),
            amount: 99.07,
            status: OrderStatus::Pending,
            created_at: 0,
            expires_at: 600,
            confirm_until: 36_000,
            paid_at: None,
        };
        let line = render_order_line(&order);
        assert!(line.contains("ORD-AB"));
        assert!(line.contains("pending"));
        assert!(line.contains("₹99.07"));
    }
}
