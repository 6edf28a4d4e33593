fn main() {
    halcyon::run_cli();
}
