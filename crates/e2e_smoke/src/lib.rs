//! Cross-crate smoke tests live under `tests/`; set `UNIADMIN_TEST_DB_URL` to run them.
