mod lifecycle_test;
mod restore_test;
