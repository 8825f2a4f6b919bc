use super::*;
use crate::error::StorageError;
use std::collections::HashMap;
use std::time::Duration;

mod common;
use common::*;

mod feed;
