fn main() {
    readplan_lib::run()
}
