use serde::Deserialize;

use crate::error::ApiError;

const DEFAULT_LIMIT: i64 = 50;
const MAX_LIMIT: i64 = 200;
const MAX_OFFSET: i64 = 10_000;

#[derive(Debug, Clone, Copy, Default, Deserialize)]
pub struct PageQuery {
    pub limit: Option<i64>,
    pub offset: Option<i64>,
}

impl PageQuery {
    pub fn resolve(self) -> Result<(i64, i64), ApiError> {
        validate_pagination(
            self.limit.unwrap_or(DEFAULT_LIMIT),
            self.offset.unwrap_or(0),
        )
    }
}

pub fn validate_pagination(limit: i64, offset: i64) -> Result<(i64, i64), ApiError> {
    if !(1..=MAX_LIMIT).contains(&limit) {
        return Err(ApiError::BadRequest("LIMIT_OUT_OF_RANGE"));
    }

    if !(0..=MAX_OFFSET).contains(&offset) {
        return Err(ApiError::BadRequest("OFFSET_OUT_OF_RANGE"));
    }

    Ok((limit, offset))
}
