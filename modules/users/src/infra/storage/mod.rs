pub mod pg_repo;
