/// True only for unique-key violations (MySQL 1062 and friends), not for
/// foreign-key or NOT NULL failures that share SQLSTATE 23000.
pub fn is_duplicate_key(e: &sqlx::Error) -> bool {
    matches!(e, sqlx::Error::Database(db_err) if db_err.is_unique_violation())
}

/// Page/per-page from query params, clamped; returns `(page, per_page, offset)`.
/// The offset is computed in 64 bits so huge page numbers cannot overflow.
pub fn paginate(page: Option<u32>, per_page: Option<u32>, default: u32, max: u32) -> (u32, u32, u64) {
    let page = page.unwrap_or(1).max(1);
    let per_page = per_page.unwrap_or(default).clamp(1, max);
    let offset = u64::from(page - 1).saturating_mul(u64::from(per_page));
    (page, per_page, offset)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pagination_is_clamped() {
        assert_eq!(paginate(None, None, 50, 200), (1, 50, 0));
        assert_eq!(paginate(Some(0), Some(0), 50, 200), (1, 1, 0));
        assert_eq!(paginate(Some(3), Some(500), 50, 200), (3, 200, 400));
    }

    #[test]
    fn huge_page_numbers_do_not_overflow() {
        let (page, per_page, offset) = paginate(Some(u32::MAX), Some(200), 50, 200);
        assert_eq!(page, u32::MAX);
        assert_eq!(per_page, 200);
        assert_eq!(offset, (u32::MAX as u64 - 1) * 200);
        assert!(offset <= i64::MAX as u64);
    }

    #[test]
    fn non_database_errors_are_not_duplicates() {
        assert!(!is_duplicate_key(&sqlx::Error::RowNotFound));
    }
}
